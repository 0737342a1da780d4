use std::{
    error::Error,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use flash2uf2_core::{
    boards::BoardInfo, encode::encoded_frame_count, image::FlashImage, load_raw,
    uf2::UF2_FRAME_SIZE, write_uf2,
};
use log::{LevelFilter, info};

use crate::reporter::ProgressBarReporter;

/// Builds a flash image for `board` from a raw filesystem dump.
pub fn load_image(
    input_path: &Path,
    board: &dyn BoardInfo,
    blocks: u32,
) -> Result<FlashImage, Box<dyn Error>> {
    let geometry = board.filesystem_geometry(blocks)?;

    info!(
        "Filesystem region {:#010x}..{:#010x} ({} blocks of {} bytes)",
        geometry.base_address(),
        geometry.end_address(),
        geometry.block_count(),
        geometry.erase_size()
    );

    let mut image = FlashImage::new(geometry);
    let input = BufReader::new(File::open(input_path)?);
    load_raw(input, &mut image)?;

    Ok(image)
}

/// Encodes `image` to `output`, with a progress bar unless logging is quieter than info.
pub fn write_image(
    image: &FlashImage,
    output: impl Write,
    board: &dyn BoardInfo,
) -> Result<u32, Box<dyn Error>> {
    info!("Using UF2 Family {:#010x}", board.family_id());

    let should_print_progress = log::max_level() >= LevelFilter::Info;

    let frames = if should_print_progress {
        let len = encoded_frame_count(image) as u64 * UF2_FRAME_SIZE as u64;
        let mut reporter = ProgressBarReporter::new(len, "Writing UF2 ", output);
        let result = write_uf2(image, &mut reporter, board.family_id());
        reporter.finish();
        result?
    } else {
        write_uf2(image, output, board.family_id())?
    };

    Ok(frames)
}

/// Writes `image` to a new UF2 file, removing the file again if encoding fails.
pub fn write_image_file(
    image: &FlashImage,
    output_path: &Path,
    board: &dyn BoardInfo,
) -> Result<(), Box<dyn Error>> {
    let output = BufWriter::new(File::create(output_path)?);

    match write_image(image, output, board) {
        Ok(frames) => {
            info!("Wrote {} frames to {}", frames, output_path.display());
            Ok(())
        }
        Err(err) => {
            fs::remove_file(output_path)?;
            Err(err)
        }
    }
}

pub fn pack<P1: AsRef<Path>, P2: AsRef<Path>>(
    input_path: &P1,
    output_path: &P2,
    board: &dyn BoardInfo,
    blocks: u32,
) -> Result<(), Box<dyn Error>> {
    let output_path = output_path.as_ref().with_extension("uf2");

    let image = load_image(input_path.as_ref(), board, blocks)?;
    write_image_file(&image, &output_path, board)
}
