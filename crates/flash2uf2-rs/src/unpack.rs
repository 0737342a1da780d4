use std::{
    error::Error,
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::Path,
};

use flash2uf2_core::{Family, boards::BoardInfo, dump_raw, image::FlashImage, read_uf2};
use log::info;

fn decode_file(
    input_path: &Path,
    board: &dyn BoardInfo,
    blocks: u32,
) -> Result<FlashImage, Box<dyn Error>> {
    let geometry = board.filesystem_geometry(blocks)?;
    let mut image = FlashImage::new(geometry);

    let input = BufReader::new(File::open(input_path)?);
    read_uf2(input, &mut image, Some(board.family_id()))?;

    Ok(image)
}

/// Decodes a UF2 file and writes the whole filesystem region out as a raw dump.
pub fn unpack<P1: AsRef<Path>, P2: AsRef<Path>>(
    input_path: &P1,
    output_path: &P2,
    board: &dyn BoardInfo,
    blocks: u32,
) -> Result<(), Box<dyn Error>> {
    let mut image = decode_file(input_path.as_ref(), board, blocks)?;

    let output_path = output_path.as_ref();
    let output = BufWriter::new(File::create(output_path)?);

    if let Err(err) = dump_raw(&mut image, output) {
        fs::remove_file(output_path)?;
        return Err(Box::new(err));
    }

    info!(
        "Wrote {} bytes to {}",
        image.geometry().capacity(),
        output_path.display()
    );

    Ok(())
}

/// Decodes a UF2 file and reports what it puts into the filesystem region.
pub fn inspect<P: AsRef<Path>>(
    input_path: &P,
    board: &dyn BoardInfo,
    blocks: u32,
) -> Result<(), Box<dyn Error>> {
    let image = decode_file(input_path.as_ref(), board, blocks)?;
    let geometry = image.geometry();

    match Family::from_id(board.family_id()) {
        Some(family) => info!("Family: {:?} ({:#010x})", family, board.family_id()),
        None => info!("Family: {:#010x}", board.family_id()),
    }
    info!(
        "Region: {:#010x}..{:#010x}",
        geometry.base_address(),
        geometry.end_address()
    );

    let pages = image.debug_dump();
    info!(
        "{} of {} blocks present, {} pages",
        image.count_present_blocks(),
        geometry.block_count(),
        pages.len()
    );

    for block in 0..geometry.block_count() {
        let count = image.count_present_pages(block);
        if count > 0 {
            info!(
                "  block {:3} {:#010x}: {}/{} pages",
                block,
                geometry.address_of(block, 0),
                count,
                geometry.pages_per_block()
            );
        }
    }

    Ok(())
}
