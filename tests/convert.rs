mod common;

use std::fs;
use std::io::Cursor;

use common::{opus_stream, opus_stream_with, read_pages, FakeTranscoder};
use opus2taf::checksum::sha1_digest;
use opus2taf::ogg::OGG_MAX_SEGMENTS;
use opus2taf::{inspect_file, read_header, ConvertOptions, TafError, TrackAssembler};
use tempfile::tempdir;

const TIMESTAMP: u32 = 0x5E1A_2B3C;

fn options(tonie_header: bool) -> ConvertOptions {
    ConvertOptions {
        tonie_header,
        timestamp: Some(TIMESTAMP),
        ..Default::default()
    }
}

#[test]
fn two_tracks_become_two_chapters() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("01 intro.opus");
    let second = dir.path().join("02 story.mp3");
    fs::write(&first, opus_stream(150)).unwrap();
    fs::write(&second, b"ID3 not really an mp3").unwrap();

    let transcoder = FakeTranscoder::default().with_stream(&second, opus_stream(50));
    let output = dir.path().join("500304E0");
    let summary = TrackAssembler::new(options(true), &transcoder)
        .convert(&[first, second], &output)
        .unwrap();

    assert_eq!(summary.tracks, 2);
    assert_eq!(summary.chapter_pages.len(), 2);
    assert_eq!(summary.chapter_pages[0], 0);
    assert_eq!(summary.granule, 200 * 960);

    let data = fs::read(&output).unwrap();
    let pages = read_pages(&data[0x1000..]);

    // Second chapter starts right after the last page holding track one
    let chapter = summary.chapter_pages[1] as usize;
    assert_eq!(pages[chapter - 1].1.granule_position, 150 * 960);
    assert!(pages[chapter].1.granule_position > 150 * 960);

    for (index, (offset, page)) in pages.iter().enumerate() {
        assert_eq!(page.page_no as usize, index);
        assert_eq!(page.serial_no, TIMESTAMP);
        assert!(page.verify_checksum());
        assert!(page.segments.len() <= OGG_MAX_SEGMENTS);
        if index >= 2 {
            assert_eq!((offset + page.page_size()) % 0x1000, 0, "page {}", index);
        }
        assert_eq!(page.is_eos(), index == pages.len() - 1);
    }
    assert_eq!(pages[2].1.page_size(), 0xE00);
    assert!(pages[3..].iter().all(|(_, p)| p.page_size() == 0x1000));
    assert!(pages
        .windows(2)
        .all(|w| w[0].1.granule_position <= w[1].1.granule_position));

    let header = read_header(&mut Cursor::new(&data)).unwrap();
    assert_eq!(header.data_hash, sha1_digest(&data[0x1000..]).to_vec());
    assert_eq!(header.data_length as usize, data.len() - 0x1000);
    assert_eq!(header.timestamp, TIMESTAMP);
    assert_eq!(header.chapter_pages, summary.chapter_pages);

    let info = inspect_file(&output).unwrap();
    assert!(info.valid, "{:?}", info);
    assert_eq!(info.chapters.len(), 2);
    assert_eq!(info.chapters[1].start_granule, 150 * 960);
    assert!((info.duration_seconds - 4.0).abs() < 1e-9);
}

#[test]
fn mono_track_aborts_before_audio() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("mono.opus");
    let sizes = vec![200; 20];
    fs::write(&input, opus_stream_with(1, &sizes, 5)).unwrap();

    let output = dir.path().join("out.taf");
    let err = TrackAssembler::new(options(true), &FakeTranscoder::default())
        .convert(&[input], &output)
        .unwrap_err();
    match err {
        TafError::InvalidIdentificationHeader { reason } => assert!(reason.contains("stereo")),
        other => panic!("unexpected error {}", other),
    }

    // Only the reserved header block made it to disk
    let data = fs::read(&output).unwrap();
    assert_eq!(data.len(), 0x1000);
    assert!(data.iter().all(|&b| b == 0));
}

#[test]
fn failed_transcode_is_reported() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("broken.flac");
    fs::write(&input, b"fLaC").unwrap();

    let err = TrackAssembler::new(options(true), &FakeTranscoder::default())
        .convert(&[input.clone()], &dir.path().join("out"))
        .unwrap_err();
    assert!(matches!(err, TafError::TranscodeFailure { input: failed, .. } if failed == input));
}

#[test]
fn header_less_output_is_plain_ogg() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("track.opus");
    fs::write(&input, opus_stream(80)).unwrap();

    let output = dir.path().join("plain.opus");
    let summary = TrackAssembler::new(options(false), &FakeTranscoder::default())
        .convert(&[input], &output)
        .unwrap();
    assert!(!summary.tonie_header);

    let data = fs::read(&output).unwrap();
    assert_eq!(&data[..4], b"OggS");
    assert_eq!(data.len() % 0x1000, 0);
    assert_eq!(summary.data_length as usize, data.len());

    let info = inspect_file(&output).unwrap();
    assert!(!info.has_tonie_header);
    assert!(info.valid, "{:?}", info);
}

#[test]
fn compliant_stream_repacks_to_identical_bytes() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("track.opus");
    fs::write(&input, opus_stream(300)).unwrap();

    let once = dir.path().join("once.opus");
    TrackAssembler::new(options(false), &FakeTranscoder::default())
        .convert(&[input], &once)
        .unwrap();

    let twice = dir.path().join("twice.opus");
    TrackAssembler::new(options(false), &FakeTranscoder::default())
        .convert(&[once.clone()], &twice)
        .unwrap();

    assert_eq!(fs::read(&once).unwrap(), fs::read(&twice).unwrap());
}

#[test]
fn three_tracks_continue_numbering() {
    let dir = tempdir().unwrap();
    let mut inputs = Vec::new();
    for (index, packets) in [30usize, 1, 90].iter().enumerate() {
        let path = dir.path().join(format!("{}.opus", index));
        fs::write(&path, opus_stream(*packets)).unwrap();
        inputs.push(path);
    }

    let output = dir.path().join("500304E0");
    let summary = TrackAssembler::new(options(true), &FakeTranscoder::default())
        .convert(&inputs, &output)
        .unwrap();

    let pages = summary.chapter_pages;
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[0], 0);
    assert!(pages[1] < pages[2]);
    // A one packet track still takes a page of its own
    assert_eq!(pages[2], pages[1] + 1);
    assert!(inspect_file(&output).unwrap().valid);
}
