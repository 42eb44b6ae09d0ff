use bevy::{
    math::{Quat, Vec3},
    prelude::*,
};

use crate::gaussian::settings::TriggerConfig;


#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TriggerDecision {
    /// camera moved enough for change side effects
    pub changed: bool,
    pub sort: bool,
}


#[derive(Clone, Copy, Debug, PartialEq)]
struct CameraState {
    position: Vec3,
    direction: Vec3,
}

impl CameraState {
    fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            direction: rotation * Vec3::NEG_Z,
        }
    }

    fn differs(&self, other: &Self, rotation_cos: f32, distance: f32) -> bool {
        self.direction.dot(other.direction) < rotation_cos
            || self.position.distance(other.position) >= distance
    }
}


// re-sort hysteresis, one per view
#[derive(Component, Clone, Debug, Default)]
pub struct SortTrigger {
    pub config: TriggerConfig,
    last_change: Option<CameraState>,
    last_sort: Option<CameraState>,
    scene_generation: u64,
    force: bool,
}

impl SortTrigger {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            ..default()
        }
    }

    pub fn force(&mut self) {
        self.force = true;
    }

    /// decides whether the camera warrants a sort, `busy` defers the sort while one is in flight
    pub fn evaluate(
        &mut self,
        position: Vec3,
        rotation: Quat,
        scene_generation: u64,
        busy: bool,
    ) -> TriggerDecision {
        let current = CameraState::new(position, rotation);

        let changed = self.last_change.is_none_or(|last| {
            current.differs(&last, self.config.rotation_cos, self.config.change_distance)
        });
        if changed {
            self.last_change = Some(current);
        }

        if scene_generation != self.scene_generation {
            self.scene_generation = scene_generation;
            self.force = true;
        }

        let wants_sort = self.force
            || self.last_sort.is_none_or(|last| {
                current.differs(&last, self.config.rotation_cos, self.config.sort_distance)
            });

        let sort = wants_sort && !busy;
        if sort {
            self.force = false;
            self.last_sort = Some(current);
        }

        TriggerDecision { changed, sort }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hysteresis() {
        let mut trigger = SortTrigger::default();

        let first = trigger.evaluate(Vec3::ZERO, Quat::IDENTITY, 0, false);
        assert!(first.sort && first.changed);

        let idle = trigger.evaluate(Vec3::ZERO, Quat::IDENTITY, 0, false);
        assert!(!idle.sort && !idle.changed);

        let nudge = trigger.evaluate(Vec3::new(0.6, 0.0, 0.0), Quat::IDENTITY, 0, false);
        assert!(nudge.changed && !nudge.sort);

        let moved = trigger.evaluate(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY, 0, false);
        assert!(moved.sort);
    }

    #[test]
    fn test_rotation_and_scene_change() {
        let mut trigger = SortTrigger::default();
        trigger.evaluate(Vec3::ZERO, Quat::IDENTITY, 0, false);

        let turned = trigger.evaluate(Vec3::ZERO, Quat::from_rotation_y(0.2), 0, false);
        assert!(turned.sort);

        let reloaded = trigger.evaluate(Vec3::ZERO, Quat::from_rotation_y(0.2), 1, false);
        assert!(reloaded.sort);
    }

    #[test]
    fn test_busy_defers() {
        let mut trigger = SortTrigger::default();

        let busy = trigger.evaluate(Vec3::ZERO, Quat::IDENTITY, 0, true);
        assert!(!busy.sort);

        let free = trigger.evaluate(Vec3::ZERO, Quat::IDENTITY, 0, false);
        assert!(free.sort);
    }
}
