use std::path::PathBuf;

use byte_unit::{Byte, UnitType};
use clap::Parser;

use bevy_splat_engine::{
    QualityTier,
    io::{
        ply::encode_ply,
        spb::SpbWriter,
    },
};


#[derive(Parser, Debug)]
#[command(about = "encode a gaussian splat ply file into a pre-encoded spb scene")]
struct Args {
    input: PathBuf,

    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = QualityTier::Medium)]
    quality: QualityTier,

    /// store buffers at full texture capacity
    #[arg(long)]
    pad: bool,

    /// print the buffer layouts as json
    #[arg(long)]
    layouts: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("converting `{}` to spb ({:?})", args.input.display(), args.quality);

    let bytes = std::fs::read(&args.input)?;
    let scene = encode_ply(&bytes, args.quality)?;
    println!("{:?} scene with {} splats", scene.kind, scene.count);

    if args.layouts {
        println!("{}", serde_json::to_string_pretty(&scene.buffers)?);
    }

    let output = args.output.unwrap_or_else(|| args.input.with_extension("spb"));
    let mut writer = std::io::BufWriter::new(std::fs::File::create(&output)?);
    SpbWriter { padded: args.pad }.write(&scene, &mut writer)?;
    drop(writer);

    let input_bytes = Byte::from_u64(bytes.len() as u64);
    let output_bytes = Byte::from_u64(std::fs::metadata(&output)?.len());
    println!(
        "{} -> {}",
        input_bytes.get_appropriate_unit(UnitType::Decimal),
        output_bytes.get_appropriate_unit(UnitType::Decimal),
    );

    Ok(())
}
