mod common;

use common::audio_packet;
use opus2taf::ogg::{OggPage, OGG_MAX_SEGMENTS};
use opus2taf::opus::PacketInfo;
use opus2taf::repack::FIRST_AUDIO_PAGE_NO;
use opus2taf::{PageLayout, PageRepacker};
use proptest::prelude::*;

fn source_pages(sizes: &[usize], per_page: usize) -> Vec<OggPage> {
    sizes
        .chunks(per_page)
        .enumerate()
        .map(|(index, chunk)| {
            let mut page = OggPage::new();
            for (seed, &len) in chunk.iter().enumerate() {
                let data = audio_packet(len, index + seed);
                page.push_packet(&data, Some(PacketInfo::parse(&data).unwrap()));
            }
            page
        })
        .collect()
}

fn packet_sizes() -> impl Strategy<Value = Vec<usize>> {
    prop_oneof![
        prop::collection::vec(1usize..=1500, 1..300),
        // Many tiny packets run into the segment table limit first
        prop::collection::vec(1usize..=12, 200..900),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every repacked page has its exact target size and the stream stays continuous
    #[test]
    fn repacked_pages_are_exact_and_continuous(
        sizes in packet_sizes(),
        per_page in 1usize..40,
        tracks in 1usize..4,
    ) {
        let layout = PageLayout::default();
        let mut repacker = PageRepacker::new(&OggPage::new(), layout);
        let mut pages = Vec::new();
        for track in 0..tracks {
            pages.extend(
                repacker
                    .repack(source_pages(&sizes, per_page), track + 1 == tracks)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?,
            );
        }

        prop_assert_eq!(pages[0].page_size(), layout.first_page_size);
        for page in &pages[1..] {
            prop_assert_eq!(page.page_size(), layout.page_size);
        }

        for (index, page) in pages.iter().enumerate() {
            prop_assert!(page.segments.len() <= OGG_MAX_SEGMENTS);
            prop_assert_eq!(page.page_no, FIRST_AUDIO_PAGE_NO + index as u32);
            prop_assert!(page.verify_checksum());
            prop_assert_eq!(page.is_eos(), index == pages.len() - 1);
        }
        prop_assert!(pages.windows(2).all(|w| w[0].granule_position <= w[1].granule_position));

        let packets: Vec<Vec<u8>> = pages.iter().flat_map(|p| p.packets()).collect();
        prop_assert_eq!(packets.len(), sizes.len() * tracks);
        let samples: u64 = packets
            .iter()
            .map(|p| PacketInfo::parse(p).map(|info| info.granule()).unwrap_or(0))
            .sum();
        prop_assert_eq!(samples, (sizes.len() * tracks) as u64 * 960);
        prop_assert_eq!(pages[pages.len() - 1].granule_position, samples);
    }
}
