use clap::{Parser, Subcommand};
use log::info;
use saferamdisk_core::config::DEFAULT_IMAGE_SIZE;
use saferamdisk_core::DiskConfig;
use saferamdisk_diskdev::device::ControlRequest;
use saferamdisk_diskdev::pnp_machine::PnpMinorFunction;
use saferamdisk_diskdev::install;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "saferamdisk")]
#[command(about = "Diagnostic tool for the SafeRamDisk virtual block device", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a formatted FAT32 image to a file
    Format {
        /// Destination path for the image
        path: PathBuf,
        /// Image size in bytes
        #[arg(long, default_value_t = DEFAULT_IMAGE_SIZE)]
        size: u64,
    },
    /// Bring up the in-process disk device and report its geometry
    Geometry {
        #[arg(long, default_value_t = DEFAULT_IMAGE_SIZE)]
        size: u64,
    },
    /// Bring up the disk device, start it, and run a read/write round trip
    Demo {
        #[arg(long, default_value_t = DEFAULT_IMAGE_SIZE)]
        size: u64,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli.command) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(command: Commands) -> saferamdisk_core::Result<()> {
    match command {
        Commands::Format { path, size } => {
            let mut buf = vec![0u8; size as usize];
            let geometry = saferamdisk_formatters::format_image(&mut buf)?;
            std::fs::write(&path, &buf).map_err(saferamdisk_core::error::DriverError::FileSystemError)?;
            info!(
                "wrote {} bytes to {} ({} cylinders, {} bytes/sector)",
                buf.len(),
                path.display(),
                geometry.cylinders,
                geometry.bytes_per_sector
            );
            Ok(())
        }
        Commands::Geometry { size } => {
            let config = DiskConfig::new(size)?;
            let (disk, _control) = install(&config)?;
            let geometry = disk.geometry();
            println!(
                "cylinders={} tracks_per_cylinder={} sectors_per_track={} bytes_per_sector={}",
                geometry.cylinders,
                geometry.tracks_per_cylinder,
                geometry.sectors_per_track,
                geometry.bytes_per_sector
            );
            Ok(())
        }
        Commands::Demo { size } => {
            let config = DiskConfig::new(size)?;
            let (disk, control) = install(&config)?;
            disk.dispatch_pnp(PnpMinorFunction::StartDevice)?;
            info!("device started: {:?}", disk.pnp_state());

            let payload = b"SafeRamDisk demo payload".to_vec();
            let written = disk.write(4096, payload.clone())?;
            info!("wrote {written} bytes at offset 4096");

            let (data, information) = disk.read(4096, payload.len())?;
            info!("read {information} bytes: {:?}", String::from_utf8_lossy(&data));

            match control.device_control(ControlRequest::IsWritable) {
                Ok(_) => info!("IsWritable: yes"),
                Err(e) => info!("IsWritable failed: {e}"),
            }

            disk.dispatch_pnp(PnpMinorFunction::RemoveDevice)?;
            info!("device removed: {:?}", disk.pnp_state());
            Ok(())
        }
    }
}
