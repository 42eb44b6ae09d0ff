#![cfg(feature = "plugin")]

use std::time::Duration;

use bevy::prelude::*;

use bevy_splat_engine::{
    QualityTier,
    SceneDescriptor,
    SplatEnginePlugin,
    SplatKind,
    engine::plugin::{
        SortedSplats,
        SplatSorter,
        SplatView,
        SplatViewChanged,
    },
    random_splats,
};


fn update_until_sorted(app: &mut App, revision: u64) -> bool {
    for _ in 0..500 {
        app.update();
        if app.world().resource::<SortedSplats>().revision > revision {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}


#[test]
fn test_plugin_sorts_views() {
    let mut app = App::new();
    app.add_plugins(SplatEnginePlugin::default());

    let scene = SplatKind::ThreeD.encode(&random_splats(1000), QualityTier::Medium);
    app.world_mut()
        .resource_mut::<SplatSorter>()
        .load_scene(SceneDescriptor::from(&scene))
        .unwrap();

    let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
    let view = app
        .world_mut()
        .spawn(SplatView {
            view_projection: projection * Mat4::look_at_rh(Vec3::new(0.0, 0.0, 40.0), Vec3::ZERO, Vec3::Y),
            position: Vec3::new(0.0, 0.0, 40.0),
            rotation: Quat::IDENTITY,
            timestamp: None,
        })
        .id();

    app.update();
    assert!(app.world().resource::<SplatSorter>().is_busy());
    assert!(!app.world().resource::<Events<SplatViewChanged>>().is_empty());

    assert!(update_until_sorted(&mut app, 0));

    let sorted = app.world().resource::<SortedSplats>();
    assert_eq!(sorted.visible_count, 1000);
    assert_eq!(sorted.indices.len(), 1000);
    assert!(!app.world().resource::<SplatSorter>().is_busy());

    // a new scene forces a fresh sort from the same pose
    let revision = sorted.revision;
    let scene = SplatKind::ThreeD.encode(&random_splats(10), QualityTier::Low);
    app.world_mut()
        .resource_mut::<SplatSorter>()
        .load_scene(SceneDescriptor::from(&scene))
        .unwrap();
    assert!(app.world().get::<SplatView>(view).is_some());

    assert!(update_until_sorted(&mut app, revision));
    assert_eq!(app.world().resource::<SortedSplats>().indices.len(), 10);
}
