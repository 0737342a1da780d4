use std::io::Write;

use assert_into::AssertInto;
use log::{debug, info};

use crate::{Uf2Error, image::FlashImage, uf2::Uf2Frame};

/// Number of frames [`encode`] produces for `image`: every page of every
/// erase block that holds at least one present page.
pub fn encoded_frame_count(image: &FlashImage) -> u32 {
    let blocks: u32 = image.count_present_blocks().assert_into();
    blocks * image.geometry().pages_per_block()
}

/// Yields the UF2 frames for a flash image in address order.
///
/// Erase blocks without any present page are skipped. Inside an emitted block
/// every page is emitted, absent ones zero filled, since the RP2040 bootrom
/// (errata RP2040-E14) mishandles sparse UF2 files.
pub struct Uf2FrameIter<'a> {
    image: &'a FlashImage,
    family_id: u32,
    num_blocks: u32,
    block: u32,
    page: u32,
    block_no: u32,
}

impl<'a> Uf2FrameIter<'a> {
    pub fn new(image: &'a FlashImage, family_id: u32) -> Self {
        Self {
            image,
            family_id,
            num_blocks: encoded_frame_count(image),
            block: 0,
            page: 0,
            block_no: 0,
        }
    }

    pub fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    fn frame(&self) -> Uf2Frame {
        let geometry = self.image.geometry();
        let mut frame = Uf2Frame::prototype(self.num_blocks, self.family_id);

        frame.target_addr = geometry.address_of(self.block, self.page);
        frame.payload_size = geometry.page_size();
        frame.block_no = self.block_no;

        match self.image.page(self.block, self.page) {
            Some(data) => {
                frame.data[..data.len()].copy_from_slice(data);
                debug!(
                    "Page {} / {} {:#08x}",
                    frame.block_no, frame.num_blocks, frame.target_addr
                );
            }
            None => debug!(
                "Page {} / {} {:#08x} (empty)",
                frame.block_no, frame.num_blocks, frame.target_addr
            ),
        }

        frame
    }
}

impl Iterator for Uf2FrameIter<'_> {
    type Item = Uf2Frame;

    fn next(&mut self) -> Option<Uf2Frame> {
        let geometry = *self.image.geometry();

        while self.block < geometry.block_count() {
            if self.page == 0 && self.image.count_present_pages(self.block) == 0 {
                self.block += 1;
                continue;
            }

            let frame = self.frame();

            self.block_no += 1;
            self.page += 1;
            if self.page == geometry.pages_per_block() {
                self.page = 0;
                self.block += 1;
            }

            return Some(frame);
        }

        None
    }
}

/// Converts the written part of a flash image into UF2 frames.
pub fn encode(image: &FlashImage, family_id: u32) -> Vec<Uf2Frame> {
    Uf2FrameIter::new(image, family_id).collect()
}

/// Streams the UF2 encoding of a flash image to `output`, returning the
/// number of frames written.
pub fn write_uf2(
    image: &FlashImage,
    mut output: impl Write,
    family_id: u32,
) -> Result<u32, Uf2Error> {
    let frames = Uf2FrameIter::new(image, family_id);
    let num_blocks = frames.num_blocks();

    info!(
        "Encoding {} blocks as {} UF2 frames",
        image.count_present_blocks(),
        num_blocks
    );

    for frame in frames {
        output
            .write_all(&frame.to_bytes())
            .map_err(Uf2Error::FailedToWrite)?;
    }
    output.flush().map_err(Uf2Error::FailedToWrite)?;

    Ok(num_blocks)
}
