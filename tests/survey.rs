mod common;

use std::fs;
use std::path::Path;

use imagesurvey::app::sibling;
use imagesurvey::{survey, AnalysisType, Settings};

use common::{column, config, files_cell, quiet_settings, read_csv, write_png, write_slice, Slice};

#[test]
fn renamed_copy_is_reported_as_duplicate() {
    let input = tempfile::tempdir().expect("tempdir");
    let output = tempfile::tempdir().expect("tempdir");
    let original = input.path().join("scan.png");
    write_png(&original, 16, 12, 0);
    fs::create_dir(input.path().join("copies")).expect("mkdir");
    fs::copy(&original, input.path().join("copies/renamed.png")).expect("copy");

    let report = output.path().join("survey.csv");
    let summary = survey(&config(
        input.path(),
        &report,
        AnalysisType::PerFile,
        quiet_settings(),
    ))
    .expect("run");
    assert_eq!(summary.items, 2);
    assert_eq!(summary.problems, 0);
    assert_eq!(summary.duplicate_groups, 1);

    let (header, rows) = read_csv(&report);
    assert_eq!(rows.len(), 2);
    let hash = column(&header, "SHA256 intensity hash");
    assert_eq!(rows[0][hash], rows[1][hash]);
    assert_eq!(rows[0][hash].len(), 64);

    let (dup_header, dup_rows) = read_csv(&sibling(&report, "_duplicates.csv"));
    assert_eq!(dup_header, header);
    assert_eq!(dup_rows.len(), 2);
    assert!(dup_rows.iter().all(|row| row[hash] == rows[0][hash]));
    assert!(!sibling(&report, "_failures.csv").exists());

    let snapshots: Vec<_> = fs::read_dir(output.path())
        .expect("list output")
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .ends_with("_imagesurvey_settings.json")
        })
        .collect();
    assert_eq!(snapshots.len(), 1);
    let restored = Settings::load(&snapshots[0].path()).expect("snapshot loads");
    assert_eq!(restored, quiet_settings());
}

#[test]
fn undecodable_files_become_problem_rows() {
    let input = tempfile::tempdir().expect("tempdir");
    let output = tempfile::tempdir().expect("tempdir");
    write_png(&input.path().join("a.png"), 8, 8, 1);
    write_png(&input.path().join("b.png"), 8, 8, 2);
    fs::write(input.path().join("notes.txt"), "not an image").expect("write");

    let report = output.path().join("all.csv");
    let summary = survey(&config(
        input.path(),
        &report,
        AnalysisType::PerFile,
        quiet_settings(),
    ))
    .expect("run");
    assert_eq!(summary.items, 3);
    assert_eq!(summary.problems, 1);
    assert_eq!(summary.duplicate_groups, 0);
    assert!(!sibling(&report, "_duplicates.csv").exists());

    let (header, rows) = read_csv(&report);
    assert_eq!(rows.len(), 3);
    let files = column(&header, "files");
    let hash = column(&header, "SHA256 intensity hash");
    let problem = rows
        .iter()
        .find(|row| files_cell(&row[files])[0].ends_with("notes.txt"))
        .expect("text file row");
    assert!(problem
        .iter()
        .enumerate()
        .all(|(index, cell)| index == files || cell.is_empty()));
    assert!(rows.iter().filter(|row| !row[hash].is_empty()).count() == 2);

    let trimmed = output.path().join("trimmed.csv");
    let settings = Settings {
        ignore_problems: true,
        ..quiet_settings()
    };
    let summary = survey(&config(input.path(), &trimmed, AnalysisType::PerFile, settings))
        .expect("run");
    assert_eq!(summary.problems, 1);
    assert_eq!(read_csv(&trimmed).1.len(), 2);
}

#[test]
fn nothing_decodable_writes_no_report() {
    let input = tempfile::tempdir().expect("tempdir");
    let output = tempfile::tempdir().expect("tempdir");
    fs::write(input.path().join("readme.md"), "# corpus").expect("write");

    let report = output.path().join("empty.csv");
    let summary = survey(&config(
        input.path(),
        &report,
        AnalysisType::PerFile,
        quiet_settings(),
    ))
    .expect("run");
    assert_eq!(summary.items, 1);
    assert_eq!(summary.problems, 1);
    assert!(!report.exists());
}

#[test]
fn per_series_run_reports_one_row_per_series() {
    let input = tempfile::tempdir().expect("tempdir");
    let output = tempfile::tempdir().expect("tempdir");
    let root = input.path().canonicalize().expect("canonical root");
    for (name, instance, z) in [("b/Z0", 2u32, 1.0), ("a/Z0", 1, 0.0)] {
        write_slice(
            &root.join(name),
            &Slice {
                instance,
                z,
                ..Slice::default()
            },
        );
    }
    write_slice(
        &root.join("other/Z0"),
        &Slice {
            series_uid: "1.2.826.0.1.3680043.2.1125.1.2",
            fill: 900,
            ..Slice::default()
        },
    );
    write_png(&root.join("photo.png"), 8, 8, 0);

    let report = output.path().join("series.csv");
    let settings = Settings {
        metadata_keys: vec!["Modality".to_string(), "0008|103e".to_string()],
        metadata_keys_headings: vec!["modality".to_string(), "description".to_string()],
        external_applications: vec!["true".into()],
        external_applications_headings: vec!["always".to_string()],
        ..quiet_settings()
    };
    let summary = survey(&config(&root, &report, AnalysisType::PerSeries, settings))
        .expect("run");
    assert_eq!(summary.items, 2);
    assert_eq!(summary.non_series_files, 1);
    assert_eq!(summary.crashed, 0);

    let (header, rows) = read_csv(&report);
    assert_eq!(rows.len(), 2);
    let files = column(&header, "files");
    let size = column(&header, "image size");
    let spacing = column(&header, "image spacing");
    let stack = rows
        .iter()
        .find(|row| files_cell(&row[files]).len() == 2)
        .expect("two-slice series");
    assert_eq!(
        files_cell(&stack[files]),
        vec![root.join("a/Z0"), root.join("b/Z0")]
    );
    assert_eq!(stack[size], "[4, 4, 2]");
    assert_eq!(stack[spacing], "[0.5, 0.5, 1.0]");
    assert_eq!(stack[column(&header, "modality")].trim(), "CT");
    assert_eq!(stack[column(&header, "description")], "");
    assert_eq!(stack[column(&header, "pixel type")], "16-bit unsigned integer gray");
    if cfg!(unix) {
        assert_eq!(stack[column(&header, "always")], "succeeded");
    }
}

#[test]
fn summary_image_has_one_page_per_plane() {
    let input = tempfile::tempdir().expect("tempdir");
    let output = tempfile::tempdir().expect("tempdir");
    for (index, name) in ["a.png", "b.png", "c.png"].iter().enumerate() {
        write_png(&input.path().join(name), 20, 10, index as u8 * 40);
    }

    let report = output.path().join("atlas.csv");
    let settings = Settings {
        create_summary_image: true,
        thumbnail_sizes: [8, 6],
        tile_sizes: [1, 2],
        interpolator: imagesurvey::thumbnail::Interpolator::Linear,
        ..quiet_settings()
    };
    survey(&config(input.path(), &report, AnalysisType::PerFile, settings)).expect("run");

    let atlas = sibling(&report, "_summary_image.tiff");
    let mut decoder = tiff::decoder::Decoder::new(fs::File::open(&atlas).expect("open atlas"))
        .expect("TIFF");
    assert_eq!(decoder.dimensions().expect("dimensions"), (8, 12));
    let mut pages = 1;
    while decoder.more_images() {
        decoder.next_image().expect("page");
        pages += 1;
    }
    assert_eq!(pages, 2);
}

fn tiff_pages(path: &Path) -> ((u32, u32), usize) {
    let mut decoder =
        tiff::decoder::Decoder::new(fs::File::open(path).expect("open atlas")).expect("TIFF");
    let dimensions = decoder.dimensions().expect("dimensions");
    let mut pages = 1;
    while decoder.more_images() {
        decoder.next_image().expect("page");
        pages += 1;
    }
    (dimensions, pages)
}

#[test]
fn summary_image_tiles_only_decoded_rows() {
    let input = tempfile::tempdir().expect("tempdir");
    let output = tempfile::tempdir().expect("tempdir");
    write_png(&input.path().join("a.png"), 20, 10, 0);
    for index in 0..3 {
        fs::write(input.path().join(format!("notes{index}.txt")), "text").expect("write");
    }

    let report = output.path().join("mixed.csv");
    let settings = Settings {
        create_summary_image: true,
        thumbnail_sizes: [8, 6],
        tile_sizes: [1, 1],
        ..quiet_settings()
    };
    let summary = survey(&config(input.path(), &report, AnalysisType::PerFile, settings))
        .expect("run");
    assert_eq!(summary.items, 4);
    assert_eq!(summary.problems, 3);
    assert_eq!(read_csv(&report).1.len(), 4);

    let (dimensions, pages) = tiff_pages(&sibling(&report, "_summary_image.tiff"));
    assert_eq!(dimensions, (8, 6));
    assert_eq!(pages, 1);
}

#[test]
fn missing_root_is_a_configuration_error() {
    let output = tempfile::tempdir().expect("tempdir");
    let result = imagesurvey::SurveyConfig::new(
        &output.path().join("absent"),
        Path::new("x.csv"),
        AnalysisType::PerFile,
        quiet_settings(),
    );
    assert!(matches!(
        result,
        Err(imagesurvey::ConfigError::MissingRoot(_))
    ));
}
