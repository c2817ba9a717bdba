use clap::Parser;
use image::{Rgba, RgbaImage};

use paintcore::cli::{
    BatchInput, CliArgs, InputKind, OutputFormat, OutputNamer, parse_output_format,
    resolve_inputs, run_one,
};
use paintcore::io::save_document;
use paintcore::Document;
use paintcore::ops::filters::FilterParams;

#[test]
fn arguments_parse_into_filters_and_crop() {
    let args = CliArgs::try_parse_from([
        "paintcore",
        "--input",
        "a.png",
        "b.pcore",
        "--filter",
        "saturation=-100",
        "--filter",
        "blur=1",
        "--output-dir",
        "out",
        "--verbose",
    ])
    .unwrap();
    assert_eq!(args.input, vec!["a.png".to_string(), "b.pcore".to_string()]);
    assert_eq!(
        args.filters,
        vec![
            FilterParams::Saturation { value: -100.0 },
            FilterParams::GaussianBlur { radius: 1.0 }
        ]
    );
    assert!(args.crop.is_none());
    assert!(args.verbose);

    assert!(CliArgs::try_parse_from(["paintcore", "-i", "a.png", "-f", "emboss"]).is_err());
    assert!(CliArgs::try_parse_from(["paintcore", "-i", "a.png", "--crop", "1,2"]).is_err());
}

#[test]
fn batch_pipeline_filters_and_crops() {
    let dir = std::env::temp_dir().join(format!("paintcore-cli-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let input = dir.join("in.png");
    let output = dir.join("out.png");
    RgbaImage::from_pixel(20, 10, Rgba([200, 100, 50, 255]))
        .save(&input)
        .unwrap();

    run_one(
        &input,
        &output,
        &[FilterParams::Invert],
        Some(paintcore::geometry::PixelRect::new(5, 0, 10, 10)),
    )
    .unwrap();

    let img = image::open(&output).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (10, 10));
    assert_eq!(img.get_pixel(0, 0), &Rgba([55, 155, 205, 255]));

    assert!(run_one(&dir.join("missing.png"), &output, &[], None).is_err());
    std::fs::remove_dir_all(&dir).ok();
}

fn temp_dir(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("paintcore-{}-{}", tag, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn globs_expand_and_classify_inputs() {
    let dir = temp_dir("glob");
    for name in ["b.png", "a.png"] {
        RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]))
            .save(dir.join(name))
            .unwrap();
    }
    save_document(&Document::new("C", 4, 4), &dir.join("c.pcore")).unwrap();
    std::fs::write(dir.join("notes.txt"), b"skip").unwrap();
    std::fs::create_dir_all(dir.join("sub.png")).unwrap();

    let png_glob = dir.join("*.png").to_string_lossy().into_owned();
    let project = dir.join("c.pcore").to_string_lossy().into_owned();
    let resolved = resolve_inputs(&[
        png_glob.clone(),
        project,
        png_glob,
        dir.join("*.gif").to_string_lossy().into_owned(),
    ]);

    let names: Vec<_> = resolved
        .iter()
        .map(|i| i.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.png", "b.png", "c.pcore"]);
    assert_eq!(resolved[0].kind, InputKind::Raster);
    assert_eq!(resolved[2].kind, InputKind::Project);

    let doc = resolved[2].load().unwrap();
    assert_eq!((doc.width(), doc.height()), (4, 4));
    assert_eq!(doc.source_path.as_deref(), Some(dir.join("c.pcore").as_path()));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn output_names_never_collide() {
    let png = parse_output_format("png").unwrap();

    let mut beside = OutputNamer::new(png, None);
    let out = beside.name_for(&BatchInput::new("shots/cat.png")).unwrap();
    assert_eq!(out, std::path::PathBuf::from("shots/cat_out.png"));
    let out = beside.name_for(&BatchInput::new("shots/cat.pcore")).unwrap();
    assert_eq!(out, std::path::PathBuf::from("shots/cat.png"));

    let mut as_project = OutputNamer::new(OutputFormat::Project, None);
    let out = as_project.name_for(&BatchInput::new("shots/cat.png")).unwrap();
    assert_eq!(out, std::path::PathBuf::from("shots/cat.pcore"));

    let mut into_dir = OutputNamer::new(png, Some("out".into()));
    let first = into_dir.name_for(&BatchInput::new("a/cat.jpg")).unwrap();
    let second = into_dir.name_for(&BatchInput::new("b/cat.jpg")).unwrap();
    let third = into_dir.name_for(&BatchInput::new("c/cat.webp")).unwrap();
    assert_eq!(first, std::path::PathBuf::from("out/cat.png"));
    assert_eq!(second, std::path::PathBuf::from("out/cat_1.png"));
    assert_eq!(third, std::path::PathBuf::from("out/cat_2.png"));
}

#[test]
fn project_input_flattens_to_raster_output() {
    let dir = temp_dir("project-in");
    let input = dir.join("art.pcore");
    let mut doc = Document::new("Art", 6, 6);
    let bg = doc.layers()[0].id;
    doc.set(bg, paintcore::geometry::PixelRect::new(1, 1, 1, 1), &[10, 20, 30, 255])
        .unwrap();
    save_document(&doc, &input).unwrap();

    let output = dir.join("art.png");
    run_one(&input, &output, &[FilterParams::Invert], None).unwrap();
    let img = image::open(&output).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (6, 6));
    assert_eq!(img.get_pixel(1, 1), &Rgba([245, 235, 225, 255]));
    assert_eq!(img.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
    std::fs::remove_dir_all(&dir).ok();
}
