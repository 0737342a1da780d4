use std::io::{self, ErrorKind, Read};

use log::{debug, info, warn};

use crate::{
    Uf2Error,
    image::{FlashError, FlashImage},
    uf2::{UF2_FRAME_SIZE, Uf2Frame},
};

/// Fills `buf` with the next frame. Returns `Ok(false)` on a clean end of
/// input, and an `UnexpectedEof` error if the input stops inside a frame.
fn read_frame(input: &mut impl Read, buf: &mut [u8; UF2_FRAME_SIZE]) -> io::Result<bool> {
    let mut filled = 0;

    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("truncated UF2 frame ({filled} of {UF2_FRAME_SIZE} bytes)"),
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => (),
            Err(e) => return Err(e),
        }
    }

    Ok(true)
}

/// Applies one frame to `image`. A frame addressed to the first page of an
/// erase block erases that block before it is written, which is how erase
/// before write is recovered from a format without erase records.
///
/// Returns `Ok(false)` if the frame is not meant for main flash and was skipped.
pub fn apply_frame(image: &mut FlashImage, frame: &Uf2Frame) -> Result<bool, FlashError> {
    if !frame.is_main_flash() {
        debug!(
            "Skipping frame {} for {:#08x}, not main flash",
            frame.block_no, frame.target_addr
        );
        return Ok(false);
    }

    // a rejected frame must not erase anything
    let target = image.check_page_write(frame.target_addr, frame.payload().len())?;
    if target.page == 0 {
        image.erase_block_index(target.block)?;
    }
    image.write_page(frame.target_addr, frame.payload())?;

    Ok(true)
}

/// Replays a UF2 stream into `image`, frame by frame in arrival order.
///
/// Stops at the first bad frame; whatever was applied before it stays
/// applied. Returns the number of frames written to the image.
pub fn read_uf2(
    mut input: impl Read,
    image: &mut FlashImage,
    expected_family: Option<u32>,
) -> Result<u32, Uf2Error> {
    let mut buf = [0; UF2_FRAME_SIZE];
    let mut frame_index = 0;
    let mut applied = 0;
    let mut warned_family = false;

    while read_frame(&mut input, &mut buf).map_err(Uf2Error::FailedToRead)? {
        let frame = Uf2Frame::from_bytes(&buf).map_err(|defect| Uf2Error::CorruptFrame {
            frame: frame_index,
            defect,
        })?;

        if let (Some(expected), Some(family)) = (expected_family, frame.family()) {
            if expected != family && !warned_family {
                warn!(
                    "UF2 family {:#010x} does not match the expected {:#010x}",
                    family, expected
                );
                warned_family = true;
            }
        }

        debug!(
            "Page {} / {} {:#08x}",
            frame.block_no, frame.num_blocks, frame.target_addr
        );

        if apply_frame(image, &frame).map_err(|source| Uf2Error::FailedToApplyFrame {
            frame: frame_index,
            source,
        })? {
            applied += 1;
        }
        frame_index += 1;
    }

    info!(
        "Applied {} of {} UF2 frames, {} blocks present",
        applied,
        frame_index,
        image.count_present_blocks()
    );

    Ok(applied)
}

/// In-memory form of [`read_uf2`].
pub fn decode(
    input: &[u8],
    image: &mut FlashImage,
    expected_family: Option<u32>,
) -> Result<u32, Uf2Error> {
    read_uf2(input, image, expected_family)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        address::Geometry,
        image::ReadStatus,
        uf2::{UF2_FLAG_NOT_MAIN_FLASH, Uf2Frame},
    };

    const BASE: u32 = 0x1000_0000;
    const FAMILY: u32 = 0xe48bff56;

    fn image() -> FlashImage {
        FlashImage::new(Geometry::new(BASE, 4 * 4096, 4096, 256).unwrap())
    }

    fn frame(target_addr: u32, fill: u8) -> Uf2Frame {
        let mut frame = Uf2Frame::prototype(1, FAMILY);
        frame.target_addr = target_addr;
        frame.payload_size = 256;
        frame.data[..256].fill(fill);
        frame
    }

    fn stream(frames: &[Uf2Frame]) -> Vec<u8> {
        frames.iter().flat_map(|f| f.to_bytes()).collect()
    }

    #[test]
    fn first_page_of_a_block_erases_it() {
        let mut image = image();
        for page in 0..16 {
            image.write_page(BASE + 0x1000 + page * 256, &[0xee; 256]).unwrap();
        }

        let input = stream(&[frame(BASE + 0x1000, 1), frame(BASE + 0x1200, 2)]);
        assert_eq!(decode(&input, &mut image, Some(FAMILY)).unwrap(), 2);

        assert_eq!(image.count_present_pages(1), 2);
        assert!(image.is_page_present(1, 0));
        assert!(image.is_page_present(1, 2));
        assert!(!image.is_page_present(1, 1));
    }

    #[test]
    fn later_pages_do_not_erase() {
        let mut image = image();
        image.write_page(BASE + 0x2000, &[0xee; 256]).unwrap();

        let input = stream(&[frame(BASE + 0x2100, 1)]);
        decode(&input, &mut image, None).unwrap();

        assert_eq!(image.count_present_pages(2), 2);
    }

    #[test]
    fn corrupt_frame_stops_decoding() {
        let mut image = image();
        let mut input = stream(&[
            frame(BASE, 1),
            frame(BASE + 0x1000, 2),
            frame(BASE + 0x2000, 3),
        ]);
        input[UF2_FRAME_SIZE] = 0;

        match decode(&input, &mut image, None) {
            Err(Uf2Error::CorruptFrame { frame: 1, .. }) => (),
            other => panic!("unexpected result {other:?}"),
        }

        assert_eq!(image.count_present_blocks(), 1);
        assert!(image.is_page_present(0, 0));
    }

    #[test]
    fn truncated_frame_is_an_io_error() {
        let mut image = image();
        let input = stream(&[frame(BASE, 1)]);

        match decode(&input[..UF2_FRAME_SIZE - 1], &mut image, None) {
            Err(Uf2Error::FailedToRead(e)) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(image.count_present_blocks(), 0);
    }

    #[test]
    fn frames_outside_the_region_fail() {
        let mut image = image();
        let input = stream(&[frame(BASE - 0x1000, 1)]);

        match decode(&input, &mut image, None) {
            Err(Uf2Error::FailedToApplyFrame {
                frame: 0,
                source: FlashError::AddressOutOfRange { .. },
            }) => (),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn misaligned_frame_fails() {
        let mut image = image();
        let input = stream(&[frame(BASE + 0x10, 1)]);

        assert!(matches!(
            decode(&input, &mut image, None),
            Err(Uf2Error::FailedToApplyFrame {
                source: FlashError::MisalignedWrite { .. },
                ..
            })
        ));
    }

    #[test]
    fn rejected_first_page_frame_does_not_erase() {
        let mut image = image();
        image.write_page(BASE + 0x100, &[0xee; 256]).unwrap();

        let mut oversized = frame(BASE, 1);
        oversized.payload_size = 300;

        match decode(&stream(&[oversized]), &mut image, None) {
            Err(Uf2Error::FailedToApplyFrame {
                frame: 0,
                source:
                    FlashError::InvalidWriteSize {
                        size: 300,
                        page_size: 256,
                    },
            }) => (),
            other => panic!("unexpected result {other:?}"),
        }

        assert_eq!(image.count_present_pages(0), 1);
        assert!(image.page(0, 1).unwrap().iter().all(|&b| b == 0xee));
    }

    #[test]
    fn family_mismatch_still_decodes() {
        let mut image = image();
        let mut other = frame(BASE + 0x1000, 3);
        other.family_id = 0xe48bff59;
        let mut no_family = frame(BASE + 0x2000, 4);
        no_family.flags = 0;

        let input = stream(&[frame(BASE, 2), other, no_family]);
        assert_eq!(decode(&input, &mut image, Some(FAMILY)).unwrap(), 3);

        assert_eq!(image.count_present_blocks(), 3);
        assert_eq!(image.page(1, 0).unwrap()[0], 3);
        assert_eq!(image.page(2, 0).unwrap()[0], 4);
    }

    #[test]
    fn non_flash_frames_are_skipped() {
        let mut image = image();
        let mut skipped = frame(BASE + 0x3000, 4);
        skipped.flags = UF2_FLAG_NOT_MAIN_FLASH;

        let input = stream(&[skipped, frame(BASE, 5)]);
        assert_eq!(decode(&input, &mut image, None).unwrap(), 1);

        let mut buf = [0; 4];
        assert_eq!(
            image.read_range(BASE + 0x3000, &mut buf),
            Ok(ReadStatus::Unavailable)
        );
        assert_eq!(image.read_range(BASE, &mut buf), Ok(ReadStatus::Available));
        assert_eq!(buf, [5; 4]);
    }

    #[test]
    fn short_payload_is_written_as_partial_page() {
        let mut image = image();
        let mut short = frame(BASE, 6);
        short.payload_size = 16;

        decode(&stream(&[short]), &mut image, None).unwrap();

        let page = image.page(0, 0).unwrap();
        assert!(page[..16].iter().all(|&b| b == 6));
        assert!(page[16..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn empty_input_is_fine() {
        let mut image = image();
        assert_eq!(decode(&[], &mut image, None).unwrap(), 0);
    }
}
