use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use dicom_series::{PixelFormat, SeriesLoader, VolumeBuffer, VolumeGeometry};

use super::test_utils::{FakeDecoder, consistent_series, header, pattern};

/// Spin until the volume is complete, checking every published slice on each
/// sample. Returns how many distinct watermarks were observed.
fn verify_until_complete(volume: &VolumeBuffer, expected: impl Fn(usize) -> Vec<u8>) -> usize {
    let depth = volume.depth() as usize;
    let mut watermarks = Vec::new();
    loop {
        let loaded = volume.loaded_slices();
        assert!(volume.loaded_voxels().len() >= loaded * volume.slice_len());
        for index in 0..loaded {
            let slice = volume.slice(index).expect("published slice is readable");
            assert_eq!(slice, expected(index).as_slice(), "slice {index} at watermark {loaded}");
        }
        if watermarks.last() != Some(&loaded) {
            watermarks.push(loaded);
        }
        if loaded == depth {
            return watermarks.len();
        }
        thread::yield_now();
    }
}

#[test]
fn readers_only_see_fully_written_slices() {
    let first = header(64, 64, PixelFormat::I16);
    let sources = consistent_series(24, &first);
    let loader = SeriesLoader::new(FakeDecoder::with_delay(Duration::from_millis(2)));
    let (tx, rx) = mpsc::channel();

    thread::scope(|scope| {
        let loader = &loader;
        let sources = &sources;
        let load = scope.spawn(move || {
            let mut tx = Some(tx);
            loader.load_series_with_progress(sources, |progress| {
                if let Some(tx) = tx.take() {
                    tx.send(Arc::clone(progress.volume)).expect("reader is listening");
                }
            })
        });

        let volume = rx.recv().expect("first slice published");
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let volume = Arc::clone(&volume);
                let first = &first;
                scope.spawn(move || verify_until_complete(&volume, |i| pattern(first, i as u8)))
            })
            .collect();

        for reader in readers {
            let observed = reader.join().expect("reader saw consistent data");
            assert!(observed >= 1);
        }
        let loaded = load
            .join()
            .expect("loader thread finishes")
            .expect("series loads");
        assert!(Arc::ptr_eq(&loaded, &volume));
    });
}

#[test]
fn writer_publishes_to_concurrent_reader() {
    let geometry = VolumeGeometry::from_header(&header(128, 128, PixelFormat::U8), 32);
    let (volume, mut writer) = VolumeBuffer::allocate(geometry).expect("allocates");
    let slice_len = volume.slice_len();
    let fill = |index: usize| vec![index as u8 + 1; slice_len];

    thread::scope(|scope| {
        let reader = scope.spawn(|| verify_until_complete(&volume, fill));

        for index in 0..32 {
            writer.write_slice(index, &fill(index));
        }

        reader.join().expect("reader saw consistent data");
    });

    let volume = writer.finish().expect("all slices written");
    assert!(volume.is_complete());
}
