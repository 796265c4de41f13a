use std::path::PathBuf;

use capypdf::color::{Color, DeviceColorSpace};
use capypdf::configure::{
    DocumentProperties, OutputIntent, OutputIntentSubtype, SerializeSettings,
};
use capypdf::destination::Destination;
use capypdf::function::{ExponentialFunction, StitchingFunction};
use capypdf::geom::Rect;
use capypdf::outline::Outline;
use capypdf::page::{Transition, TransitionStyle};
use capypdf::shading::{PatchMesh, TriangleMesh};
use capypdf::structure::StructureType;
use capypdf::text::{BuiltinFont, Text};
use capypdf::{CapyError, Document};

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

fn uncompressed() -> SerializeSettings {
    SerializeSettings {
        compress_content_streams: false,
        ..SerializeSettings::default()
    }
}

fn document_at(path: PathBuf) -> Document {
    Document::with_serialize_settings(path, DocumentProperties::default(), uncompressed()).unwrap()
}

fn system_font() -> Option<Vec<u8>> {
    FONT_CANDIDATES
        .iter()
        .find_map(|path| std::fs::read(path).ok())
}

fn gradient(document: &mut Document) -> capypdf::handle::FunctionId {
    document
        .add_function(ExponentialFunction {
            domain: [0.0, 1.0],
            c0: Color::Gray(0.0),
            c1: Color::Gray(1.0),
            n: 1.0,
        })
        .unwrap()
}

#[test]
fn document_without_pages_creates_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.pdf");

    let document = document_at(path.clone());
    let result = document.write();

    assert_eq!(result, Err(CapyError::NoPagesDefined));
    assert_eq!(result.unwrap_err().to_string(), "No pages defined.");
    assert!(!path.exists());
}

#[test]
fn written_file_is_a_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("page.pdf");

    let mut document = document_at(path.clone());
    let mut page = document.new_page_context();
    {
        let mut state = page.push_state();
        state.set_fill_color(&Color::Rgb(0.2, 0.4, 0.6)).unwrap();
        state.rect(100.0, 100.0, 50.0, 50.0).unwrap();
        state.fill();
    }
    document.add_page(page).unwrap();
    document.write().unwrap();

    let data = std::fs::read(&path).unwrap();
    assert!(data.starts_with(b"%PDF-1.7"));
    let text = String::from_utf8_lossy(&data);
    assert!(text.contains("0.2 0.4 0.6 rg"));
    assert!(text.trim_end().ends_with("%%EOF"));
}

#[test]
fn negative_line_width_keeps_earlier_content() {
    let document = document_at(PathBuf::from("unused.pdf"));
    let mut page = document.new_page_context();

    page.move_to(0.0, 0.0).unwrap();
    page.line_to(10.0, 10.0).unwrap();
    let err = page.set_line_width(-0.1).unwrap_err();
    assert_eq!(err.to_string(), "Negative line width.");
    page.stroke();

    let mut document = document;
    document.add_page(page).unwrap();
    let data = String::from_utf8_lossy(&document.finish().unwrap()).into_owned();
    assert!(data.contains("0 0 m\n10 10 l\nS"));
    assert!(!data.contains(" w\n"));
}

#[test]
fn unbalanced_page_is_rejected() {
    let mut document = document_at(PathBuf::from("unused.pdf"));
    let mut page = document.new_page_context();
    page.save_state();

    assert!(matches!(
        document.add_page(page),
        Err(CapyError::UnbalancedState(_))
    ));
}

#[test]
fn destination_to_a_later_page_resolves() {
    let mut document = document_at(PathBuf::from("unused.pdf"));
    document
        .add_outline(Outline {
            title: "Appendix".to_string(),
            destination: Some(Destination::xyz(2, 0.0, 800.0, None)),
            ..Outline::default()
        })
        .unwrap();

    for _ in 0..3 {
        let page = document.new_page_context();
        document.add_page(page).unwrap();
    }

    // The page tree is object 1, the pages follow in order.
    let data = String::from_utf8_lossy(&document.finish().unwrap()).into_owned();
    assert!(data.contains("[4 0 R /XYZ 0 800"));
    assert!(!data.contains("[3 0 R /XYZ"));
    assert!(data.contains("(Appendix)"));
}

#[test]
fn stitching_function_bounds_are_checked() {
    let mut document = document_at(PathBuf::from("unused.pdf"));
    let first = gradient(&mut document);
    let second = gradient(&mut document);
    let third = gradient(&mut document);

    let wrong = document.add_function(StitchingFunction {
        domain: [0.0, 1.0],
        functions: vec![first, second, third],
        bounds: vec![0.5],
        encode: vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
    });
    assert!(matches!(wrong, Err(CapyError::InvalidArgument(_))));

    let right = document.add_function(StitchingFunction {
        domain: [0.0, 1.0],
        functions: vec![first, second, third],
        bounds: vec![0.3, 0.6],
        encode: vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
    });
    assert!(right.is_ok());
}

#[test]
fn mesh_inputs_of_the_wrong_size_are_rejected() {
    let gray = DeviceColorSpace::Gray;
    let black = Color::Gray(0.0);

    let mut triangles = TriangleMesh::new(gray);
    assert!(matches!(
        triangles.add_triangle(&[0.0; 5], &[black.clone(), black.clone(), black.clone()]),
        Err(CapyError::InvalidArgument(_))
    ));
    assert!(matches!(
        triangles.add_triangle(&[0.0; 6], &[black.clone(), black.clone()]),
        Err(CapyError::InvalidArgument(_))
    ));

    let mut patches = PatchMesh::new(gray);
    assert!(matches!(
        patches.add_patch(&[0.0; 16], &vec![black.clone(); 4]),
        Err(CapyError::InvalidArgument(_))
    ));
    assert!(patches.add_patch(&[0.0; 24], &vec![black.clone(); 4]).is_ok());
    assert!(matches!(
        patches.extend_patch(1, &[0.0; 16], &vec![black.clone(); 3]),
        Err(CapyError::InvalidArgument(_))
    ));
}

#[test]
fn mesh_shading_is_registered() {
    let mut document = document_at(PathBuf::from("unused.pdf"));
    let mut mesh = TriangleMesh::new(DeviceColorSpace::Rgb);
    mesh.add_triangle(
        &[0.0, 0.0, 100.0, 0.0, 50.0, 100.0],
        &[
            Color::Rgb(1.0, 0.0, 0.0),
            Color::Rgb(0.0, 1.0, 0.0),
            Color::Rgb(0.0, 0.0, 1.0),
        ],
    )
    .unwrap();

    let shading = document.add_shading(mesh).unwrap();
    let mut page = document.new_page_context();
    page.paint_shading(shading).unwrap();
    document.add_page(page).unwrap();

    let data = String::from_utf8_lossy(&document.finish().unwrap()).into_owned();
    assert!(data.contains("/ShadingType 4"));
    assert!(data.contains("/s0 sh"));
}

#[test]
fn structure_parent_from_another_document_is_rejected() {
    let mut first = document_at(PathBuf::from("first.pdf"));
    let mut second = document_at(PathBuf::from("second.pdf"));

    let foreign = second
        .add_structure_item(StructureType::Document, None, None)
        .unwrap();

    assert_eq!(
        first.add_structure_item(StructureType::P, Some(foreign), None),
        Err(CapyError::UnknownParent {
            kind: "structure item",
            index: 0
        })
    );
}

#[test]
fn tiling_patterns_are_used_as_colors() {
    let mut document = document_at(PathBuf::from("unused.pdf"));
    let mut cell = document.new_tiling_context(Rect::from_xywh(0.0, 0.0, 10.0, 10.0).unwrap());
    cell.rect(0.0, 0.0, 5.0, 5.0).unwrap();
    cell.fill();

    let pattern = document
        .add_tiling_pattern(
            cell,
            capypdf::pattern::TilingPatternProperties {
                x_step: 10.0,
                y_step: 10.0,
                matrix: None,
            },
        )
        .unwrap();

    let mut page = document.new_page_context();
    page.set_fill_color(&Color::Pattern(pattern)).unwrap();
    page.rect(0.0, 0.0, 100.0, 100.0).unwrap();
    page.fill();
    document.add_page(page).unwrap();

    let data = String::from_utf8_lossy(&document.finish().unwrap()).into_owned();
    assert!(data.contains("/PatternType 1"));
    assert!(data.contains("/Pattern cs"));
}

#[test]
fn loading_a_font_twice_gives_distinct_handles() {
    let mut document = document_at(PathBuf::from("unused.pdf"));

    assert!(matches!(
        document.load_font_data(b"definitely not a font".to_vec()),
        Err(CapyError::Font(_))
    ));

    let Some(data) = system_font() else {
        // No font available on this machine.
        return;
    };

    let first = document.load_font_data(data.clone()).unwrap();
    let second = document.load_font_data(data).unwrap();
    assert_ne!(first, second);
    assert!(document.glyph_id(first, 'A').unwrap().is_some());
    assert!(document.text_width(first, 12.0, "Hello").unwrap() > 0.0);

    let mut text = Text::new();
    text.set_font(second, 12.0).unwrap();
    text.next_line(72.0, 720.0).unwrap();
    text.render_text("Hello").unwrap();

    let mut page = document.new_page_context();
    page.render_text_obj(&text).unwrap();
    document.add_page(page).unwrap();

    let data = String::from_utf8_lossy(&document.finish().unwrap()).into_owned();
    assert!(data.contains("/Subtype /Type0"));
    assert!(data.contains("/Identity-H"));
    assert!(data.contains("/ToUnicode"));
}

#[test]
fn builtin_fonts_are_shared_and_unembedded() {
    let mut document = document_at(PathBuf::from("unused.pdf"));
    let helvetica = document.builtin_font(BuiltinFont::Helvetica).unwrap();
    assert_eq!(document.builtin_font(BuiltinFont::Helvetica).unwrap(), helvetica);
    let courier = document.builtin_font(BuiltinFont::Courier).unwrap();
    assert_ne!(helvetica, courier);
    assert!(matches!(
        document.text_width(helvetica, 12.0, "Hi"),
        Err(CapyError::Font(_))
    ));

    let mut text = Text::new();
    text.set_font(helvetica, 24.0).unwrap();
    text.next_line(72.0, 720.0).unwrap();
    text.render_text("Hello").unwrap();

    let mut page = document.new_page_context();
    page.render_text_obj(&text).unwrap();
    document.add_page(page).unwrap();

    let data = String::from_utf8_lossy(&document.finish().unwrap()).into_owned();
    assert!(data.contains("/BaseFont /Helvetica"));
    assert!(data.contains("/BaseFont /Courier"));
    assert!(data.contains("(Hello) Tj"));
    assert!(!data.contains("/FontFile"));
}

#[test]
fn builtin_fonts_are_rejected_with_an_output_intent() {
    let mut profile = vec![0; 128];
    profile[8] = 4;
    profile[9] = 0x30;
    profile[16..20].copy_from_slice(b"CMYK");

    let properties = DocumentProperties {
        output_intent: Some(OutputIntent {
            subtype: OutputIntentSubtype::PdfX,
            identifier: "FOGRA39".to_string(),
            profile,
        }),
        ..DocumentProperties::default()
    };
    let mut document =
        Document::with_serialize_settings("unused.pdf", properties, uncompressed()).unwrap();

    assert!(matches!(
        document.builtin_font(BuiltinFont::TimesRoman),
        Err(CapyError::InvalidArgument(_))
    ));
}

#[test]
fn text_with_non_ascii_is_rejected_for_builtin_fonts() {
    let mut document = document_at(PathBuf::from("unused.pdf"));
    let font = document.builtin_font(BuiltinFont::TimesRoman).unwrap();

    let mut text = Text::new();
    text.set_font(font, 12.0).unwrap();
    text.render_text("Grüße").unwrap();

    let mut page = document.new_page_context();
    assert!(matches!(
        page.render_text_obj(&text),
        Err(CapyError::Font(_))
    ));
    document.add_page(page).unwrap();

    let data = String::from_utf8_lossy(&document.finish().unwrap()).into_owned();
    assert!(!data.contains(" Tf"));
}

#[test]
fn page_transitions_are_written() {
    let mut document = document_at(PathBuf::from("unused.pdf"));
    let mut page = document.new_page_context();
    page.set_transition(Transition {
        style: Some(TransitionStyle::Wipe),
        duration: Some(0.5),
        direction: Some(90),
        ..Transition::default()
    })
    .unwrap();
    document.add_page(page).unwrap();
    document.add_page(document.new_page_context()).unwrap();

    let data = String::from_utf8_lossy(&document.finish().unwrap()).into_owned();
    assert_eq!(data.matches("/Type /Trans").count(), 1);
    assert!(data.contains("/S /Wipe"));
    assert!(data.contains("/D 0.5"));
    assert!(data.contains("/Di 90"));
}

#[test]
fn device_colors_follow_the_output_colorspace() {
    let properties = DocumentProperties {
        output_colorspace: DeviceColorSpace::Gray,
        ..DocumentProperties::default()
    };
    let mut document =
        Document::with_serialize_settings("unused.pdf", properties, uncompressed()).unwrap();

    let mut page = document.new_page_context();
    page.set_fill_color(&Color::Rgb(1.0, 0.0, 0.0)).unwrap();
    page.rect(0.0, 0.0, 10.0, 10.0).unwrap();
    page.fill();
    document.add_page(page).unwrap();

    let data = String::from_utf8_lossy(&document.finish().unwrap()).into_owned();
    assert!(data.contains("0.3 g"));
    assert!(!data.contains(" rg"));
}
