use std::{error::Error, path::Path};

use flash2uf2_core::boards::BoardInfo;
use log::info;
use sysinfo::Disks;

use crate::pack::{load_image, write_image_file};

/// Packs a raw filesystem dump and copies it straight onto a board sitting in
/// its UF2 bootloader.
pub fn deploy<P: AsRef<Path>>(
    input_path: P,
    board: &dyn BoardInfo,
    blocks: u32,
) -> Result<(), Box<dyn Error>> {
    let image = load_image(input_path.as_ref(), board, blocks)?;

    let disks = Disks::new_with_refreshed_list();

    let mut uf2_drive = None;
    for disk in disks.list() {
        let mount = disk.mount_point();

        if mount.join("INFO_UF2.TXT").is_file() {
            info!("Found uf2 disk {}", &mount.to_string_lossy());
            uf2_drive = Some(mount.to_owned());
            break;
        }
    }

    let output_path = match uf2_drive {
        Some(uf2_drive) => uf2_drive.join("out.uf2"),
        None => return Err("Unable to find a mounted UF2 bootloader drive".into()),
    };

    info!("Transfering filesystem to {}", board.board_name());

    write_image_file(&image, &output_path, board)
}
