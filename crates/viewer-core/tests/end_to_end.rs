//! End-to-end tests over a synthesized on-disk archive.

use std::io::Cursor;
use std::path::Path;

use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use viewer_core::{
    BandSelection, CacheLimit, ChipError, Normalization, SampleId, Season, TileRequest, Viewer,
    ViewerConfig,
};

const SPLIT: &str = "ssl4eo_l_oli_sr";
const BANDS: usize = 7;
const SIZE: u32 = 8;

/// Write a 7-band Gray16 GeoTIFF (one IFD per band) with geographic geo
/// tags anchored at (lat, lon).
fn write_band_file(path: &Path, lat: f64, lon: f64, seed: u16) {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buf).unwrap();
        for band in 0..BANDS as u16 {
            // Pattern (not just offset) varies per band and scene, so
            // distinct render keys produce distinct normalized output
            let data: Vec<u16> = (0..SIZE * SIZE)
                .map(|i| ((i * (13 + band as u32 * 7 + seed as u32)) % 887) as u16)
                .collect();
            let mut image = encoder
                .new_image::<colortype::Gray16>(SIZE, SIZE)
                .unwrap();
            if band == 0 {
                image
                    .encoder()
                    .write_tag(
                        Tag::Unknown(geotiff_parser::TAG_MODEL_TIEPOINT),
                        &[0.0, 0.0, 0.0, lon, lat, 0.0][..],
                    )
                    .unwrap();
                image
                    .encoder()
                    .write_tag(
                        Tag::Unknown(geotiff_parser::TAG_MODEL_PIXEL_SCALE),
                        &[0.00025, 0.00025, 0.0][..],
                    )
                    .unwrap();
                // GTModelType = geographic
                image
                    .encoder()
                    .write_tag(
                        Tag::Unknown(geotiff_parser::TAG_GEO_KEY_DIRECTORY),
                        &[1u16, 1, 0, 1, 1024, 0, 1, 2][..],
                    )
                    .unwrap();
            }
            image.write_data(&data).unwrap();
        }
    }
    std::fs::write(path, buf.into_inner()).unwrap();
}

fn seed_archive(with_locations: bool) -> TempDir {
    let root = TempDir::new().unwrap();

    // Full sample: one scene per season
    let scenes = [
        "LC08_034032_20200115",
        "LC08_034032_20200415",
        "LC08_034032_20200715",
        "LC08_034032_20201015",
    ];
    for (i, scene) in scenes.iter().enumerate() {
        let dir = root.path().join(SPLIT).join("0029460").join(scene);
        std::fs::create_dir_all(&dir).unwrap();
        write_band_file(&dir.join("all_bands.tif"), 40.0, -105.0, 100 + i as u16);
    }

    // Known sample whose band file was never downloaded
    let dir = root
        .path()
        .join(SPLIT)
        .join("0029461")
        .join("LC08_034033_20200120");
    std::fs::create_dir_all(&dir).unwrap();

    if with_locations {
        std::fs::write(
            root.path().join("locations.json"),
            r#"{"0029460": [40.0, -105.0], "0029461": [41.0, -106.0]}"#,
        )
        .unwrap();
    }
    root
}

fn open_viewer(root: &TempDir) -> Viewer {
    let mut config = ViewerConfig::new(root.path());
    config.band_count = Some(BANDS);
    config.cache_limit = CacheLimit::Entries(16);
    Viewer::open(config).unwrap()
}

fn id(s: &str) -> SampleId {
    SampleId::new(s).unwrap()
}

#[tokio::test]
async fn renders_native_size_rgb_png_and_serves_repeat_from_cache() {
    let root = seed_archive(true);
    let viewer = open_viewer(&root);

    let request = TileRequest::new(id("0029460"), Season::Summer)
        .with_bands(BandSelection::new(4, 3, 2))
        .with_normalization(Normalization::new(2.0, 98.0).unwrap());

    let png = viewer.render_tile(&request).await.unwrap();

    // Native dimensions, 8-bit, 3-channel
    assert_eq!(&png[..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
    assert_eq!(u32::from_be_bytes(png[16..20].try_into().unwrap()), SIZE);
    assert_eq!(u32::from_be_bytes(png[20..24].try_into().unwrap()), SIZE);
    assert_eq!(png[24], 8, "bit depth");
    assert_eq!(png[25], 2, "color type RGB");

    // Remove the underlying file: a cached repeat must not touch storage
    std::fs::remove_dir_all(root.path().join(SPLIT).join("0029460")).unwrap();
    let again = viewer.render_tile(&request).await.unwrap();
    assert_eq!(png, again);

    let stats = viewer.cache_stats();
    assert_eq!(stats.hits.load(std::sync::atomic::Ordering::Relaxed), 1);
    assert_eq!(stats.misses.load(std::sync::atomic::Ordering::Relaxed), 1);
}

#[tokio::test]
async fn different_keys_render_distinct_tiles() {
    let root = seed_archive(true);
    let viewer = open_viewer(&root);

    let summer = TileRequest::new(id("0029460"), Season::Summer);
    let winter = TileRequest::new(id("0029460"), Season::Winter);

    let a = viewer.render_tile(&summer).await.unwrap();
    let b = viewer.render_tile(&winter).await.unwrap();
    assert_ne!(a, b, "seasons have different scene data");

    let false_color = TileRequest::new(id("0029460"), Season::Summer)
        .with_bands(BandSelection::new(5, 4, 3));
    let c = viewer.render_tile(&false_color).await.unwrap();
    assert_ne!(a, c, "band combinations differ");
}

#[tokio::test]
async fn invalid_selection_is_rejected_before_cache_and_disk() {
    let root = seed_archive(true);
    let viewer = open_viewer(&root);

    let request = TileRequest::new(id("0029460"), Season::Summer)
        .with_bands(BandSelection::new(9, 1, 2));
    let err = viewer.render_tile(&request).await.unwrap_err();
    assert!(matches!(err, ChipError::InvalidSelection(_)));

    let stats = viewer.cache_stats();
    assert_eq!(stats.misses.load(std::sync::atomic::Ordering::Relaxed), 0);
}

#[tokio::test]
async fn error_taxonomy_per_request() {
    let root = seed_archive(true);
    let viewer = open_viewer(&root);

    // Known sample, file never downloaded
    let err = viewer
        .render_tile(&TileRequest::new(id("0029461"), Season::Winter))
        .await
        .unwrap_err();
    assert!(matches!(err, ChipError::MissingData(_)));

    // Season with no scene at all
    let err = viewer
        .render_tile(&TileRequest::new(id("0029461"), Season::Summer))
        .await
        .unwrap_err();
    assert!(matches!(err, ChipError::NotFound(_)));

    // Unknown sample
    let err = viewer
        .render_tile(&TileRequest::new(id("9999999"), Season::Summer))
        .await
        .unwrap_err();
    assert!(matches!(err, ChipError::NotFound(_)));
}

#[tokio::test]
async fn nearest_sample_lookup() {
    let root = seed_archive(true);
    let viewer = open_viewer(&root);

    let hit = viewer.nearest_sample(40.01, -105.02).unwrap();
    assert_eq!(hit.sample_id, id("0029460"));
    assert!(hit.distance_km < 5.0, "{}", hit.distance_km);

    let hit = viewer.nearest_sample(41.1, -106.1).unwrap();
    assert_eq!(hit.sample_id, id("0029461"));
}

#[tokio::test]
async fn missing_location_index_degrades_lookup_only() {
    let root = seed_archive(false);
    let viewer = open_viewer(&root);

    // Rendering still works
    let png = viewer
        .render_tile(&TileRequest::new(id("0029460"), Season::Spring))
        .await
        .unwrap();
    assert!(!png.is_empty());

    // Lookup reports the degraded mode, never an arbitrary sample
    for (lat, lon) in [(40.0, -105.0), (0.0, 0.0), (-70.0, 120.0)] {
        assert!(matches!(
            viewer.nearest_sample(lat, lon),
            Err(ChipError::IndexUnavailable)
        ));
    }
}

#[tokio::test]
async fn sample_listing_and_info() {
    let root = seed_archive(true);
    let viewer = open_viewer(&root);

    let all = viewer.list_samples(None);
    assert_eq!(all, vec![id("0029460"), id("0029461")]);
    assert_eq!(viewer.list_samples(Some("00294")).len(), 2);
    assert!(viewer.list_samples(Some("1")).is_empty());

    let info = viewer.sample_info(&id("0029460")).await.unwrap();
    assert_eq!(info.scenes.len(), 4);
    let seasons: Vec<Season> = info.scenes.iter().map(|s| s.season).collect();
    assert_eq!(
        seasons,
        vec![Season::Winter, Season::Spring, Season::Summer, Season::Fall]
    );
    assert!(info.scenes.iter().all(|s| s.has_data));

    let bounds = info.bounds.expect("geo tags present");
    assert!((bounds.lat_max - 40.0).abs() < 1e-9);
    assert!((bounds.lon_min - (-105.0)).abs() < 1e-9);

    let info = viewer.sample_info(&id("0029461")).await.unwrap();
    assert_eq!(info.scenes.len(), 1);
    assert!(!info.scenes[0].has_data);
    assert!(info.bounds.is_none());
}

#[tokio::test]
async fn startup_fails_on_missing_dataset_root() {
    let err = Viewer::open(ViewerConfig::new("/definitely/not/a/real/path")).unwrap_err();
    assert!(matches!(err, ChipError::Config(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_requests_share_one_render() {
    let root = seed_archive(true);
    let viewer = std::sync::Arc::new(open_viewer(&root));

    let request = TileRequest::new(id("0029460"), Season::Fall);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let viewer = std::sync::Arc::clone(&viewer);
        let request = request.clone();
        handles.push(tokio::spawn(
            async move { viewer.render_tile(&request).await },
        ));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }
    assert!(results.windows(2).all(|w| w[0] == w[1]));

    // However the calls interleaved, every request was served by a cache
    // hit, a coalesced wait, or the single leading render.
    let stats = viewer.cache_stats();
    let hits = stats.hits.load(std::sync::atomic::Ordering::Relaxed);
    let coalesced = stats.coalesced.load(std::sync::atomic::Ordering::Relaxed);
    let misses = stats.misses.load(std::sync::atomic::Ordering::Relaxed);
    assert_eq!(hits + misses, 8);
    assert_eq!(misses, coalesced + 1, "one leader per miss wave");
}
