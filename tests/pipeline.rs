use std::path::{Path, PathBuf};
use std::sync::Mutex;

use gdal::raster::{Buffer, ColorInterpretation};
use gdal::{Dataset, DriverManager};
use ndarray::Array2;

use satmatch::core::feedback::{CancelFlag, Feedback, LogFeedback};
use satmatch::core::processing::pipeline::{
    EqualizeInputs, MatchInputs, To8BitsInputs, run_equalize, run_histogram_match, run_to8bits,
};
use satmatch::core::processing::stretch::StretchBounds;
use satmatch::core::processing::tiles::TilePixels;
use satmatch::io::services::{clip_raster, rasterize_mask};
use satmatch::io::writers::tiff::write_rgba_tile;
use satmatch::{MatchParams, RasterSource, RunStatus, StretchStyle, VectorMask};

const ORIGIN_X: f64 = 700000.0;
const ORIGIN_Y: f64 = 6610000.0;
const SIZE: usize = 200;

fn source_value(x: usize, y: usize, band: usize) -> u8 {
    (10 + (x + y) % 200 + band * 5) as u8
}

fn reference_value(x: usize, y: usize, band: usize) -> u8 {
    (40 + ((x + 2 * y) % 150) + band * 3) as u8
}

/// 3-band byte GeoTIFF, 1 m pixels, upper-left corner at (ORIGIN_X, ORIGIN_Y)
fn write_rgb(path: &Path, value: fn(usize, usize, usize) -> u8) {
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut ds = driver
        .create_with_band_type::<u8, _>(path, SIZE, SIZE, 3)
        .unwrap();
    ds.set_geo_transform(&[ORIGIN_X, 1.0, 0.0, ORIGIN_Y, 0.0, -1.0])
        .unwrap();
    for band in 1..=3 {
        let data: Vec<u8> = (0..SIZE)
            .flat_map(|y| (0..SIZE).map(move |x| value(x, y, band)))
            .collect();
        let mut buf = Buffer::new((SIZE, SIZE), data);
        ds.rasterband(band)
            .unwrap()
            .write((0, 0), (SIZE, SIZE), &mut buf)
            .unwrap();
    }
}

/// Square polygon from (700020, 6609820) to (700180, 6609980)
fn write_work_area(path: &Path) {
    let json = r#"{
  "type": "FeatureCollection",
  "features": [
    { "type": "Feature", "properties": { "id": 1 },
      "geometry": { "type": "Polygon", "coordinates": [[
        [700020, 6609820], [700180, 6609820], [700180, 6609980],
        [700020, 6609980], [700020, 6609820]
      ]] } }
  ]
}"#;
    std::fs::write(path, json).unwrap();
}

struct Fixture {
    dir: tempfile::TempDir,
    source: PathBuf,
    reference: PathBuf,
    work_area: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.tif");
    let reference = dir.path().join("reference.tif");
    let work_area = dir.path().join("work_area.geojson");
    write_rgb(&source, source_value);
    write_rgb(&reference, reference_value);
    write_work_area(&work_area);
    Fixture {
        dir,
        source,
        reference,
        work_area,
    }
}

fn small_grid_params() -> MatchParams {
    let mut params = MatchParams::default();
    params.tile.cell_size = 100.0;
    params.overview_levels = vec![2];
    params
}

fn read_band(ds: &Dataset, band: usize) -> Array2<u8> {
    let (cols, rows) = ds.raster_size();
    let buf = ds
        .rasterband(band)
        .unwrap()
        .read_as::<u8>((0, 0), (cols, rows), (cols, rows), None)
        .unwrap();
    Array2::from_shape_vec((rows, cols), buf.data().to_vec()).unwrap()
}

#[test]
fn tile_writer_sets_georeferencing_and_alpha() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tile.tif");
    let mut alpha = Array2::<u8>::zeros((50, 80));
    alpha[[0, 0]] = 255;
    let pixels = TilePixels {
        red: Array2::from_elem((50, 80), 12),
        green: Array2::from_elem((50, 80), 34),
        blue: Array2::from_elem((50, 80), 56),
        alpha,
        clamped: 0,
    };
    let gt = [705000.0, 0.5, 0.0, 6615000.0, 0.0, -0.5];
    write_rgba_tile(&path, &pixels, &gt, "", None).unwrap();

    let ds = Dataset::open(&path).unwrap();
    assert_eq!(ds.raster_size(), (80, 50));
    assert_eq!(ds.raster_count(), 4);
    assert_eq!(ds.geo_transform().unwrap(), gt);
    assert!(matches!(
        ds.rasterband(4).unwrap().color_interpretation(),
        ColorInterpretation::AlphaBand
    ));
    let blue = read_band(&ds, 3);
    assert_eq!(blue[[49, 79]], 56);
    let alpha = read_band(&ds, 4);
    assert_eq!(alpha[[0, 0]], 255);
    assert_eq!(alpha[[0, 1]], 0);
}

#[test]
fn clip_crops_to_the_mask_extent() {
    let fx = fixture();
    let mask = VectorMask::open(&fx.work_area).unwrap();
    assert_eq!(mask.extent.xmin, 700020.0);

    let clipped = fx.dir.path().join("clipped.tif");
    clip_raster(&fx.source, &mask, &clipped).unwrap();

    let ds = Dataset::open(&clipped).unwrap();
    assert_eq!(ds.raster_size(), (160, 160));
    assert_eq!(ds.raster_count(), 4);
    let gt = ds.geo_transform().unwrap();
    assert_eq!((gt[0], gt[3]), (700020.0, 6609980.0));
    assert_eq!(ds.rasterband(1).unwrap().no_data_value(), Some(0.0));

    let red = read_band(&ds, 1);
    assert_eq!(red[[0, 0]], source_value(20, 20, 1));
    assert_eq!(red[[159, 3]], source_value(23, 179, 1));
    let alpha = read_band(&ds, 4);
    assert!(alpha.iter().all(|&a| a == 255));
}

#[test]
fn rasterized_mask_covers_the_layer_extent() {
    let fx = fixture();
    let mask = VectorMask::open(&fx.work_area).unwrap();
    let out = fx.dir.path().join("mask.tif");
    rasterize_mask(&mask, 0.5, &out).unwrap();

    let ds = Dataset::open(&out).unwrap();
    assert_eq!(ds.raster_size(), (320, 320));
    let burnt = read_band(&ds, 1);
    assert!(burnt.iter().all(|&v| v == 255));
}

#[test]
fn histogram_match_writes_tiles_and_mosaic() {
    let fx = fixture();
    let output = fx.dir.path().join("out").join("mosaic.vrt");
    std::fs::create_dir_all(output.parent().unwrap()).unwrap();
    let inputs = MatchInputs {
        source: fx.source.clone(),
        reference: fx.reference.clone(),
        work_area: fx.work_area.clone(),
        cutout: Some(fx.work_area.clone()),
        output: output.clone(),
        params: small_grid_params(),
    };
    let feedback = LogFeedback::new();

    let report = run_histogram_match(&inputs, &feedback)
        .unwrap()
        .completed()
        .expect("run should complete");
    assert_eq!(feedback.progress(), 100);
    assert_eq!((report.grid.columns, report.grid.rows), (2, 2));
    assert_eq!(report.tiles.len(), 4);
    assert_eq!(report.tables.red.len(), 256);

    let tile_dir = fx.dir.path().join("out").join("mosaic");
    let first = tile_dir.join("PSUD_SAT50_700000_6609800_2019_5KM.tif");
    assert_eq!(report.tiles[0], first);
    for tile in &report.tiles {
        assert!(tile.exists(), "{:?} missing", tile);
    }

    // Upper-left tile: the mask starts 20 px in from its left and top edges
    let upper_left =
        Dataset::open(tile_dir.join("PSUD_SAT50_700000_6609900_2019_5KM.tif")).unwrap();
    assert_eq!(upper_left.raster_size(), (100, 100));
    assert_eq!(
        upper_left.geo_transform().unwrap(),
        [700000.0, 1.0, 0.0, 6610000.0, 0.0, -1.0]
    );
    let alpha = read_band(&upper_left, 4);
    let red = read_band(&upper_left, 1);
    assert_eq!(alpha[[5, 5]], 0);
    assert_eq!(red[[5, 5]], 0);
    assert_eq!(alpha[[50, 50]], 255);
    let expected = report.tables.red.entries()[source_value(50, 50, 1) as usize];
    assert_eq!(red[[50, 50]], expected);

    let vrt = Dataset::open(&output).unwrap();
    assert_eq!(vrt.raster_size(), (200, 200));
    assert_eq!(vrt.raster_count(), 4);
    assert!(PathBuf::from(format!("{}.ovr", output.display())).exists());
}

#[test]
fn without_cutout_every_valid_pixel_is_kept() {
    let fx = fixture();
    let output = fx.dir.path().join("open.vrt");
    let inputs = MatchInputs {
        source: fx.source.clone(),
        reference: fx.reference.clone(),
        work_area: fx.work_area.clone(),
        cutout: None,
        output: output.clone(),
        params: MatchParams {
            overview_levels: vec![],
            ..small_grid_params()
        },
    };
    let report = run_histogram_match(&inputs, &LogFeedback::new())
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(report.tiles.len(), 4);

    let tile = Dataset::open(&report.tiles[0]).unwrap();
    let alpha = read_band(&tile, 4);
    assert!(alpha.iter().all(|&a| a == 255));
}

#[test]
fn cancelled_run_stops_before_the_mosaic() {
    let fx = fixture();
    let output = fx.dir.path().join("cancelled.vrt");
    let inputs = MatchInputs {
        source: fx.source.clone(),
        reference: fx.reference.clone(),
        work_area: fx.work_area.clone(),
        cutout: None,
        output: output.clone(),
        params: small_grid_params(),
    };
    let flag = CancelFlag::new();
    flag.cancel();
    let feedback = LogFeedback::with_cancel_flag(flag);
    assert!(feedback.is_canceled());

    let status = run_histogram_match(&inputs, &feedback).unwrap();
    assert!(!status.is_completed());
    assert!(matches!(status, RunStatus::Cancelled));
    assert!(!output.exists());
    assert!(feedback.progress() < 100);
}

/// Feedback asking to stop as soon as progress moves past `stop_after`
struct StopAfter {
    stop_after: u8,
    seen: Mutex<Vec<u8>>,
}

impl StopAfter {
    fn new(stop_after: u8) -> Self {
        Self {
            stop_after,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<u8> {
        self.seen.lock().unwrap().clone()
    }
}

impl Feedback for StopAfter {
    fn set_progress(&self, percent: u8) {
        self.seen.lock().unwrap().push(percent);
    }
    fn push_info(&self, _message: &str) {}
    fn report_error(&self, message: &str) {
        panic!("unexpected error: {}", message);
    }
    fn is_canceled(&self) -> bool {
        self.seen
            .lock()
            .unwrap()
            .last()
            .is_some_and(|&p| p > self.stop_after)
    }
}

#[test]
fn cancelling_between_tiles_keeps_written_tiles_and_skips_the_mosaic() {
    let fx = fixture();
    let output = fx.dir.path().join("stopped.vrt");
    let inputs = MatchInputs {
        source: fx.source.clone(),
        reference: fx.reference.clone(),
        work_area: fx.work_area.clone(),
        cutout: Some(fx.work_area.clone()),
        output: output.clone(),
        params: small_grid_params(),
    };
    let feedback = StopAfter::new(60);

    let status = run_histogram_match(&inputs, &feedback).unwrap();
    assert!(matches!(status, RunStatus::Cancelled));

    // Band tables, mask and grid checkpoints all passed, then the first tile
    let seen = feedback.seen();
    for percent in [20, 30, 40, 50, 60, 70] {
        assert!(seen.contains(&percent), "{} missing from {:?}", percent, seen);
    }
    assert_eq!(seen.last(), Some(&70));
    assert!(!seen.contains(&99));

    let written: Vec<_> = std::fs::read_dir(fx.dir.path().join("stopped"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(written.len(), 1, "{:?}", written);
    assert!(!output.exists());
}

#[test]
fn cell_outside_the_cutout_is_written_blank() {
    let fx = fixture();
    // Two squares in opposite cells of a 2x2 grid of 100 m
    let cutout = fx.dir.path().join("cutout.geojson");
    std::fs::write(
        &cutout,
        r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"id":1},"geometry":{"type":"Polygon","coordinates":[[
          [700010,6609910],[700090,6609910],[700090,6609990],[700010,6609990],[700010,6609910]]]}},
        {"type":"Feature","properties":{"id":2},"geometry":{"type":"Polygon","coordinates":[[
          [700110,6609810],[700190,6609810],[700190,6609890],[700110,6609890],[700110,6609810]]]}}
        ]}"#,
    )
    .unwrap();
    let output = fx.dir.path().join("split.vrt");
    let inputs = MatchInputs {
        source: fx.source.clone(),
        reference: fx.reference.clone(),
        work_area: fx.work_area.clone(),
        cutout: Some(cutout),
        output,
        params: MatchParams {
            overview_levels: vec![],
            ..small_grid_params()
        },
    };
    let report = run_histogram_match(&inputs, &LogFeedback::new())
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!((report.grid.columns, report.grid.rows), (2, 2));
    assert_eq!(report.tiles.len(), 4);

    let upper_right = fx
        .dir
        .path()
        .join("split")
        .join("PSUD_SAT50_700100_6609900_2019_5KM.tif");
    assert!(report.tiles.contains(&upper_right));
    let ds = Dataset::open(&upper_right).unwrap();
    assert_eq!(ds.raster_size(), (100, 100));
    assert_eq!(ds.raster_count(), 4);
    assert_eq!(
        ds.geo_transform().unwrap(),
        [700100.0, 1.0, 0.0, 6610000.0, 0.0, -1.0]
    );
    for band in 1..=4 {
        assert!(read_band(&ds, band).iter().all(|&v| v == 0), "band {}", band);
    }

    let upper_left = Dataset::open(
        fx.dir
            .path()
            .join("split")
            .join("PSUD_SAT50_700000_6609900_2019_5KM.tif"),
    )
    .unwrap();
    assert_eq!(read_band(&upper_left, 4)[[50, 50]], 255);
}

#[test]
fn blocks_sample_unaligned_sources_at_pixel_centres() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shifted.tif");
    let (cols, rows) = (40usize, 10usize);
    {
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        let mut ds = driver
            .create_with_band_type::<u8, _>(&path, cols, rows, 1)
            .unwrap();
        ds.set_geo_transform(&[0.3, 1.0, 0.0, 10.0, 0.0, -1.0])
            .unwrap();
        let data: Vec<u8> = (0..rows).flat_map(|_| 0..cols as u8).collect();
        let mut buf = Buffer::new((cols, rows), data);
        ds.rasterband(1)
            .unwrap()
            .write((0, 0), (cols, rows), &mut buf)
            .unwrap();
    }
    let source = RasterSource::open(&path).unwrap();

    // Half-metre pixels over a window starting 9.7 source pixels in
    let extent = satmatch::Extent::new(10.0, 0.0, 30.0, 10.0);
    let block = source.read_block(1, &extent, 40, 10).unwrap();
    for c in 0..40 {
        let centre = 10.0 + (c as f64 + 0.5) * 0.5;
        let expected = (centre - 0.3).floor();
        assert_eq!(block.values[[3, c]], expected, "column {}", c);
    }
    assert!(block.valid.iter().all(|&v| v));

    // Centres past the right edge (x >= 40.3) are invalid
    let beyond = satmatch::Extent::new(30.0, 0.0, 50.0, 10.0);
    let block = source.read_block(1, &beyond, 40, 10).unwrap();
    assert!(block.valid[[0, 0]]);
    assert_eq!(block.values[[0, 0]], 29.0);
    assert!(block.valid[[0, 20]]);
    assert!(!block.valid[[0, 21]]);
    assert!(!block.valid[[9, 39]]);
}

#[test]
fn invalid_desaturation_is_rejected_before_any_work() {
    let fx = fixture();
    let output = fx.dir.path().join("never.vrt");
    let inputs = MatchInputs {
        source: fx.source.clone(),
        reference: fx.reference.clone(),
        work_area: fx.work_area.clone(),
        cutout: None,
        output: output.clone(),
        params: MatchParams {
            desaturation: 0,
            ..MatchParams::default()
        },
    };
    let feedback = LogFeedback::new();
    assert!(run_histogram_match(&inputs, &feedback).is_err());
    assert_eq!(feedback.progress(), 0);
    assert!(!output.exists());
}

#[test]
fn equalize_against_itself_gives_identity_bounds() {
    let fx = fixture();
    let style_path = fx.dir.path().join("self.style.json");
    let inputs = EqualizeInputs {
        source: fx.source.clone(),
        reference: fx.source.clone(),
        work_area: fx.work_area.clone(),
        style: Some(style_path.clone()),
    };
    let report = run_equalize(&inputs, &LogFeedback::new())
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(report.style_path, style_path);
    for bounds in [report.style.red, report.style.green, report.style.blue] {
        assert!(bounds.min.abs() < 1e-9, "{:?}", bounds);
        assert!((bounds.max - 256.0).abs() < 1e-9, "{:?}", bounds);
    }
    let loaded = StretchStyle::load(&style_path).unwrap();
    assert_eq!(loaded.red, report.style.red);
}

#[test]
fn to8bits_applies_style_bounds() {
    let fx = fixture();
    let style_path = fx.dir.path().join("identity.style.json");
    let identity = StretchBounds { min: 0.0, max: 255.0 };
    let doubled = StretchBounds { min: 0.0, max: 127.5 };
    StretchStyle::new(identity, identity, doubled)
        .save(&style_path)
        .unwrap();

    let output = fx.dir.path().join("export.tif");
    let inputs = To8BitsInputs {
        source: fx.source.clone(),
        style: Some(style_path),
        cutout: None,
        output: output.clone(),
    };
    let report = run_to8bits(&inputs, &LogFeedback::new())
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!((report.width, report.height), (SIZE, SIZE));

    let ds = Dataset::open(&output).unwrap();
    assert_eq!(ds.raster_count(), 4);
    assert_eq!(ds.geo_transform().unwrap()[0], ORIGIN_X);
    let red = read_band(&ds, 1);
    let blue = read_band(&ds, 3);
    let alpha = read_band(&ds, 4);
    assert_eq!(red[[7, 3]], source_value(3, 7, 1));
    let raw_blue = source_value(3, 7, 3) as u16;
    assert_eq!(blue[[7, 3]] as u16, (raw_blue * 2).min(255));
    assert!(alpha.iter().all(|&a| a == 255));
}

#[test]
fn work_area_outside_the_raster_is_an_error() {
    let fx = fixture();
    let far = fx.dir.path().join("far.geojson");
    std::fs::write(
        &far,
        r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{},
        "geometry":{"type":"Polygon","coordinates":[[[0,0],[10,0],[10,10],[0,10],[0,0]]]}}]}"#,
    )
    .unwrap();
    let inputs = EqualizeInputs {
        source: fx.source.clone(),
        reference: fx.reference.clone(),
        work_area: far,
        style: None,
    };
    assert!(run_equalize(&inputs, &LogFeedback::new()).is_err());
}
