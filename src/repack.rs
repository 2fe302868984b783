// Repacking of audio pages into fixed size flash blocks
//
// Source pages come in whatever size the encoder chose. The box reads audio
// one block at a time, so every output page must be exactly one block long
// (the very first one shorter, it shares its block with the header pages).
// Packets are moved whole, page numbers and granule positions continue
// across tracks.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::config::PageLayout;
use crate::error::{Result, TafError};
use crate::ogg::{OggPage, OGG_MAX_SEGMENTS, OGG_PAGE_HEADER_SIZE};
use crate::opus::OpusPacket;

/// Page number of the first audio page, after the two header pages
pub const FIRST_AUDIO_PAGE_NO: u32 = 2;

/// Packets of a track in stream order, as laced segments
struct PacketQueue {
    pages: VecDeque<OggPage>,
    requeued: Vec<Vec<OpusPacket>>,
}

impl PacketQueue {
    fn new(pages: Vec<OggPage>) -> Self {
        PacketQueue {
            pages: pages.into(),
            requeued: Vec::new(),
        }
    }

    fn push_front(&mut self, packet: Vec<OpusPacket>) {
        self.requeued.push(packet);
    }

    fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.pages.iter().all(|p| p.segments.is_empty())
    }

    /// Take the next packet, joining it with its continuation on following pages
    fn next_packet(&mut self) -> Option<Vec<OpusPacket>> {
        if let Some(packet) = self.requeued.pop() {
            return Some(packet);
        }

        let mut segments = self.take_from_front()?;
        while segments.last().is_some_and(|s| s.spanning_packet) {
            match self.take_from_front() {
                Some(continuation) => segments.extend(continuation),
                None => {
                    warn!("Stream ends inside a packet, keeping the partial packet");
                    return Some(segments);
                }
            }
        }

        if segments.len() == 1 {
            return Some(segments);
        }

        // Relace so the moved packet never carries source page boundaries
        let info = segments[0].info;
        let data: Vec<u8> = segments.iter().flat_map(|s| s.data.iter().copied()).collect();
        Some(OpusPacket::segment(&data, info))
    }

    fn take_from_front(&mut self) -> Option<Vec<OpusPacket>> {
        loop {
            let page = self.pages.front_mut()?;
            if page.segments.is_empty() {
                self.pages.pop_front();
                continue;
            }
            let segments = page.take_first_packet();
            if page.segments.is_empty() {
                self.pages.pop_front();
            }
            return Some(segments);
        }
    }
}

/// Bytes a laced packet adds to a page: its segment table entries plus payload
fn packet_cost(packet: &[OpusPacket]) -> usize {
    packet.len() + packet.iter().map(OpusPacket::size).sum::<usize>()
}

/// Turns source audio pages into pages of exactly the layout's sizes.
///
/// One repacker serves all tracks of a file, carrying page number and
/// granule position from one track to the next.
#[derive(Debug, Clone)]
pub struct PageRepacker {
    template: OggPage,
    layout: PageLayout,
    first_page_pending: bool,
    granule: u64,
    next_page_no: u32,
}

impl PageRepacker {
    pub fn new(template: &OggPage, layout: PageLayout) -> Self {
        PageRepacker {
            template: OggPage::from_template(template),
            layout,
            first_page_pending: true,
            granule: 0,
            next_page_no: FIRST_AUDIO_PAGE_NO,
        }
    }

    /// Page number the next produced page will get
    pub fn next_page_no(&self) -> u32 {
        self.next_page_no
    }

    /// Granule position of the last produced page
    pub fn granule(&self) -> u64 {
        self.granule
    }

    fn target_size(&self) -> usize {
        if self.first_page_pending {
            self.layout.first_page_size
        } else {
            self.layout.page_size
        }
    }

    /// Repack one track. With `last_track` set, the final page gets the
    /// end of stream flag.
    pub fn repack(&mut self, pages: Vec<OggPage>, last_track: bool) -> Result<Vec<OggPage>> {
        let mut queue = PacketQueue::new(pages);
        let mut output = Vec::new();
        let mut page = OggPage::from_template(&self.template);

        loop {
            let Some(packet) = queue.next_packet() else {
                if page.segments.is_empty() {
                    break;
                }
                // Flushing can hand a packet back when the page cannot be padded
                let finished = self.finish_page(page, &mut queue, last_track)?;
                output.push(finished);
                page = OggPage::from_template(&self.template);
                continue;
            };

            let cost = packet_cost(&packet);
            let target = self.target_size();
            let fits = page.page_size() + cost <= target && page.segments.len() + packet.len() <= OGG_MAX_SEGMENTS;

            if !fits {
                if page.segments.is_empty() {
                    return Err(TafError::PacketTooLarge {
                        size: cost - packet.len(),
                        limit: target - OGG_PAGE_HEADER_SIZE,
                    });
                }

                // Packets handed back by the flush go before this one
                queue.push_front(packet);
                let finished = self.finish_page(page, &mut queue, last_track)?;
                output.push(finished);
                page = OggPage::from_template(&self.template);
                continue;
            }

            page.append_segments(packet);
        }

        if output.is_empty() {
            warn!("Track has no audio packets");
        }
        debug!(
            pages = output.len(),
            next_page_no = self.next_page_no,
            granule = self.granule,
            "Repacked track"
        );
        Ok(output)
    }

    fn finish_page(&mut self, mut page: OggPage, queue: &mut PacketQueue, last_track: bool) -> Result<OggPage> {
        let target = self.target_size();

        loop {
            match page.pad(target) {
                Ok(()) => break,
                Err(TafError::PaddingImpossible { needed }) if page.packet_count() > 1 => {
                    warn!(
                        page_no = self.next_page_no,
                        needed,
                        "Page cannot be padded exactly, moving its last packet to the next page"
                    );
                    if let Some(packet) = page.pop_last_packet() {
                        queue.push_front(packet);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        if last_track && queue.is_empty() {
            page.set_eos();
        }

        page.page_no = self.next_page_no;
        page.correct_values(self.granule)?;

        self.granule = page.granule_position;
        self.next_page_no += 1;
        self.first_page_pending = false;
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opus::PacketInfo;

    const TOC_CELT_20MS: u8 = (31 << 3) | 0b100;

    fn template() -> OggPage {
        let mut page = OggPage::new();
        page.serial_no = 77;
        page
    }

    /// Source pages holding `per_page` packets of `len` bytes each
    fn source_pages(count: usize, per_page: usize, len: usize) -> Vec<OggPage> {
        let mut pages = Vec::new();
        let mut remaining = count;
        while remaining > 0 {
            let mut page = template();
            for _ in 0..per_page.min(remaining) {
                let mut data = vec![0x11; len];
                data[0] = TOC_CELT_20MS;
                page.push_packet(&data, Some(PacketInfo::parse(&data).unwrap()));
                remaining -= 1;
            }
            pages.push(page);
        }
        pages
    }

    #[test]
    fn test_pages_have_block_sizes() {
        let mut repacker = PageRepacker::new(&template(), PageLayout::default());
        let pages = repacker.repack(source_pages(200, 10, 250), true).unwrap();

        assert_eq!(pages[0].page_size(), 0xE00);
        for page in &pages[1..pages.len() - 1] {
            assert_eq!(page.page_size(), 0x1000);
        }
        assert!(pages.iter().all(|p| p.segments.len() <= OGG_MAX_SEGMENTS));
        assert!(pages.iter().all(|p| p.verify_checksum()));
    }

    #[test]
    fn test_numbering_granule_and_eos() {
        let mut repacker = PageRepacker::new(&template(), PageLayout::default());
        let pages = repacker.repack(source_pages(120, 7, 180), true).unwrap();

        for (i, page) in pages.iter().enumerate() {
            assert_eq!(page.page_no, FIRST_AUDIO_PAGE_NO + i as u32);
            assert_eq!(page.serial_no, 77);
            assert_eq!(page.is_eos(), i == pages.len() - 1);
        }
        assert!(pages.windows(2).all(|w| w[0].granule_position <= w[1].granule_position));
        assert_eq!(pages.last().unwrap().granule_position, 120 * 960);
        assert_eq!(repacker.granule(), 120 * 960);
    }

    #[test]
    fn test_continues_across_tracks() {
        let mut repacker = PageRepacker::new(&template(), PageLayout::default());
        let first = repacker.repack(source_pages(50, 5, 200), false).unwrap();
        assert!(!first.last().unwrap().is_eos());
        assert_eq!(first.last().unwrap().page_size(), 0x1000);

        let chapter = repacker.next_page_no();
        let second = repacker.repack(source_pages(30, 5, 200), true).unwrap();
        assert_eq!(second[0].page_no, chapter);
        assert_eq!(second[0].page_size(), 0x1000);
        assert_eq!(second.last().unwrap().granule_position, 80 * 960);
        assert!(second.last().unwrap().is_eos());
    }

    #[test]
    fn test_packets_survive_unchanged_in_order() {
        let source = source_pages(64, 4, 300);
        let expected: Vec<Vec<u8>> = source.iter().flat_map(|p| p.packets()).collect();

        let mut repacker = PageRepacker::new(&template(), PageLayout::default());
        let pages = repacker.repack(source, true).unwrap();
        let packets: Vec<Vec<u8>> = pages.iter().flat_map(|p| p.packets()).collect();

        assert_eq!(packets.len(), expected.len());
        for (got, want) in packets.iter().zip(&expected) {
            // Padding may add a count byte and trailing zeros, never touches the frame
            let got_info = PacketInfo::parse(got).unwrap();
            assert_eq!(got_info.granule(), 960);
            assert_eq!(got[0] | 0b11, want[0] | 0b11);
            if got.len() == want.len() {
                assert_eq!(got, want);
            }
        }
    }

    #[test]
    fn test_packet_spanning_source_pages_is_joined() {
        let mut data = vec![0x22; 600];
        data[0] = TOC_CELT_20MS;
        let segments = OpusPacket::segment(&data, Some(PacketInfo::parse(&data).unwrap()));

        let mut head = template();
        head.append_segments(segments[..2].to_vec());
        let mut tail = template();
        tail.header_type = crate::ogg::OGG_HEADER_TYPE_CONTINUATION;
        tail.append_segments(segments[2..].to_vec());

        let mut repacker = PageRepacker::new(&template(), PageLayout::default());
        let pages = repacker.repack(vec![head, tail], true).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].packet_count(), 1);
        assert_eq!(pages[0].granule_position, 960);
        assert_eq!(pages[0].page_size(), 0xE00);
    }

    #[test]
    fn test_oversized_packet_is_rejected() {
        let mut repacker = PageRepacker::new(&template(), PageLayout::default());
        let err = repacker.repack(source_pages(1, 1, 5000), true).unwrap_err();
        assert!(matches!(err, TafError::PacketTooLarge { size: 5000, .. }));
    }

    #[test]
    fn test_empty_track() {
        let mut repacker = PageRepacker::new(&template(), PageLayout::default());
        assert!(repacker.repack(Vec::new(), true).unwrap().is_empty());
        assert_eq!(repacker.next_page_no(), FIRST_AUDIO_PAGE_NO);
    }
}
