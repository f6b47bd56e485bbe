//! PowerPoint (OOXML) packaging of the slide shape model.
//!
//! Every deck shares one blank layout and master. The theme's accent colors
//! come from the deck palette. Pictures are embedded as-is; a picture whose
//! file cannot be read is left out of its slide.

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::packager::{DeckPackager, Shape, Slide, SlideDeck};
use crate::{Error, Result};

const EMU_PER_INCH: f64 = 914_400.0;

const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const CT_PREFIX: &str = "application/vnd.openxmlformats-officedocument";

pub struct PptxPackager;

impl DeckPackager for PptxPackager {
    fn extension(&self) -> &'static str {
        "pptx"
    }

    fn package(&self, deck: &SlideDeck, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut media = Vec::new();
        let mut slides = Vec::new();
        for (idx, slide) in deck.slides.iter().enumerate() {
            slides.push(slide_part(idx + 1, slide, &mut media));
        }

        let mut part = |name: &str, body: &[u8]| -> Result<()> {
            zip.start_file(name, options).map_err(zip_err)?;
            zip.write_all(body)?;
            Ok(())
        };
        part("[Content_Types].xml", content_types(slides.len()).as_bytes())?;
        part(
            "_rels/.rels",
            rels(&[("rId1", "officeDocument", "ppt/presentation.xml")]).as_bytes(),
        )?;
        part("ppt/presentation.xml", presentation(deck, slides.len()).as_bytes())?;
        part("ppt/_rels/presentation.xml.rels", presentation_rels(slides.len()).as_bytes())?;
        part("ppt/slideMasters/slideMaster1.xml", MASTER.replace("{NS}", NS).as_bytes())?;
        part(
            "ppt/slideMasters/_rels/slideMaster1.xml.rels",
            rels(&[
                ("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml"),
                ("rId2", "theme", "../theme/theme1.xml"),
            ])
            .as_bytes(),
        )?;
        part("ppt/slideLayouts/slideLayout1.xml", LAYOUT.replace("{NS}", NS).as_bytes())?;
        part(
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
            rels(&[("rId1", "slideMaster", "../slideMasters/slideMaster1.xml")]).as_bytes(),
        )?;
        part("ppt/theme/theme1.xml", theme(deck).as_bytes())?;
        for (idx, (xml, slide_rels)) in slides.iter().enumerate() {
            part(&format!("ppt/slides/slide{}.xml", idx + 1), xml.as_bytes())?;
            part(&format!("ppt/slides/_rels/slide{}.xml.rels", idx + 1), slide_rels.as_bytes())?;
        }
        for (name, bytes) in &media {
            part(&format!("ppt/media/{name}"), bytes)?;
        }
        zip.finish().map_err(zip_err)?;
        tracing::debug!(path = %path.display(), slides = slides.len(), media = media.len(), "pptx written");
        Ok(())
    }
}

fn zip_err(err: zip::result::ZipError) -> Error {
    Error::backend("zip", err)
}

fn emu(inches: f64) -> i64 {
    (inches * EMU_PER_INCH).round() as i64
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

/// `#RRGGBB` as the bare hex DrawingML wants; black when malformed.
fn srgb(color: &str) -> String {
    let hex = color.trim().trim_start_matches('#');
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        hex.to_ascii_uppercase()
    } else {
        "000000".to_string()
    }
}

fn rels(entries: &[(&str, &str, &str)]) -> String {
    let mut out = format!(r#"{XML_DECL}<Relationships xmlns="{REL_NS}">"#);
    for (id, kind, target) in entries {
        let _ = write!(out, r#"<Relationship Id="{id}" Type="{REL_TYPE}/{kind}" Target="{target}"/>"#);
    }
    out.push_str("</Relationships>");
    out
}

fn content_types(slides: usize) -> String {
    let mut out = format!(
        r#"{XML_DECL}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Default Extension="jpeg" ContentType="image/jpeg"/><Default Extension="gif" ContentType="image/gif"/><Default Extension="svg" ContentType="image/svg+xml"/>"#
    );
    let overrides = [
        ("/ppt/presentation.xml", "presentationml.presentation.main+xml"),
        ("/ppt/slideMasters/slideMaster1.xml", "presentationml.slideMaster+xml"),
        ("/ppt/slideLayouts/slideLayout1.xml", "presentationml.slideLayout+xml"),
        ("/ppt/theme/theme1.xml", "theme+xml"),
    ];
    for (part, kind) in overrides {
        let _ = write!(out, r#"<Override PartName="{part}" ContentType="{CT_PREFIX}.{kind}"/>"#);
    }
    for n in 1..=slides {
        let _ = write!(
            out,
            r#"<Override PartName="/ppt/slides/slide{n}.xml" ContentType="{CT_PREFIX}.presentationml.slide+xml"/>"#
        );
    }
    out.push_str("</Types>");
    out
}

fn presentation(deck: &SlideDeck, slides: usize) -> String {
    let mut ids = String::new();
    for n in 0..slides {
        let _ = write!(ids, r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + n, n + 3);
    }
    format!(
        r#"{XML_DECL}<p:presentation {NS} saveSubsetFonts="1"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:sldIdLst>{ids}</p:sldIdLst><p:sldSz cx="{}" cy="{}"/><p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#,
        emu(deck.width),
        emu(deck.height),
    )
}

fn presentation_rels(slides: usize) -> String {
    let mut entries = vec![
        ("rId1".to_string(), "slideMaster", "slideMasters/slideMaster1.xml".to_string()),
        ("rId2".to_string(), "theme", "theme/theme1.xml".to_string()),
    ];
    for n in 1..=slides {
        entries.push((format!("rId{}", n + 2), "slide", format!("slides/slide{n}.xml")));
    }
    let borrowed: Vec<(&str, &str, &str)> = entries
        .iter()
        .map(|(id, kind, target)| (id.as_str(), *kind, target.as_str()))
        .collect();
    rels(&borrowed)
}

fn image_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("png"),
        "jpg" | "jpeg" => Some("jpeg"),
        "gif" => Some("gif"),
        "svg" => Some("svg"),
        _ => None,
    }
}

fn xfrm(x: f64, y: f64, w: f64, h: f64) -> String {
    format!(
        r#"<a:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></a:xfrm>"#,
        emu(x),
        emu(y),
        emu(w),
        emu(h)
    )
}

fn run(text: &str, font: &str, size: f64, color: &str, bold: bool) -> String {
    format!(
        r#"<a:r><a:rPr lang="en-US" sz="{}" b="{}" dirty="0"><a:solidFill><a:srgbClr val="{}"/></a:solidFill><a:latin typeface="{}"/></a:rPr><a:t>{}</a:t></a:r>"#,
        (size * 100.0).round() as i64,
        u8::from(bold),
        srgb(color),
        escape(font),
        escape(text)
    )
}

fn text_box(id: usize, frame: String, paragraphs: String) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="Text {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr>{frame}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:noFill/></p:spPr><p:txBody><a:bodyPr wrap="square" rtlCol="0"><a:normAutofit/></a:bodyPr><a:lstStyle/>{paragraphs}</p:txBody></p:sp>"#
    )
}

/// Slide XML and its relationships. Embedded pictures are appended to
/// `media` as `(file name, bytes)`.
fn slide_part(number: usize, slide: &Slide, media: &mut Vec<(String, Vec<u8>)>) -> (String, String) {
    let mut background = String::new();
    let mut tree = String::new();
    let mut slide_rels = vec![(
        "rId1".to_string(),
        "slideLayout",
        "../slideLayouts/slideLayout1.xml".to_string(),
    )];

    for (pos, shape) in slide.shapes.iter().enumerate() {
        let id = pos + 2;
        match shape {
            Shape::Background { fill } => {
                background = format!(
                    r#"<p:bg><p:bgPr><a:solidFill><a:srgbClr val="{}"/></a:solidFill><a:effectLst/></p:bgPr></p:bg>"#,
                    srgb(fill)
                );
            }
            Shape::Bar { x, y, w, h, fill } => {
                let _ = write!(
                    tree,
                    r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="Bar {id}"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr>{}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:solidFill><a:srgbClr val="{}"/></a:solidFill><a:ln><a:noFill/></a:ln></p:spPr></p:sp>"#,
                    xfrm(*x, *y, *w, *h),
                    srgb(fill)
                );
            }
            Shape::Text { x, y, w, h, text, font, size, color, bold } => {
                let paragraph = format!("<a:p>{}</a:p>", run(text, font, *size, color, *bold));
                tree.push_str(&text_box(id, xfrm(*x, *y, *w, *h), paragraph));
            }
            Shape::Bullets { x, y, w, h, items, font, size, color } => {
                let mut paragraphs = String::new();
                for item in items {
                    let _ = write!(
                        paragraphs,
                        r#"<a:p><a:pPr marL="342900" indent="-342900"><a:buFont typeface="Arial"/><a:buChar char="&#8226;"/></a:pPr>{}</a:p>"#,
                        run(item, font, *size, color, false)
                    );
                }
                if paragraphs.is_empty() {
                    paragraphs.push_str("<a:p/>");
                }
                tree.push_str(&text_box(id, xfrm(*x, *y, *w, *h), paragraphs));
            }
            Shape::Picture { x, y, w, h, path } => {
                let path = Path::new(path);
                let Some(ext) = image_extension(path) else {
                    tracing::warn!(slide = number, path = %path.display(), "unsupported picture type skipped");
                    continue;
                };
                let bytes = match std::fs::read(path) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        tracing::warn!(slide = number, path = %path.display(), error = %err, "picture skipped");
                        continue;
                    }
                };
                let name = format!("image{}.{ext}", media.len() + 1);
                let rel_id = format!("rId{}", slide_rels.len() + 1);
                let _ = write!(
                    tree,
                    r#"<p:pic><p:nvPicPr><p:cNvPr id="{id}" name="Picture {id}"/><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="{rel_id}"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr>{}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#,
                    xfrm(*x, *y, *w, *h)
                );
                slide_rels.push((rel_id, "image", format!("../media/{name}")));
                media.push((name, bytes));
            }
        }
    }

    let xml = format!(
        r#"{XML_DECL}<p:sld {NS}><p:cSld>{background}<p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{tree}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#
    );
    let borrowed: Vec<(&str, &str, &str)> = slide_rels
        .iter()
        .map(|(id, kind, target)| (id.as_str(), *kind, target.as_str()))
        .collect();
    (xml, rels(&borrowed))
}

fn theme(deck: &SlideDeck) -> String {
    let fallback = ["1E3A8A", "2563EB", "93C5FD", "F59E0B", "10B981", "8B5CF6"];
    let mut accents = String::new();
    for (n, default) in fallback.iter().enumerate() {
        let color = deck.palette.get(n).map(|c| srgb(c)).unwrap_or_else(|| default.to_string());
        let _ = write!(accents, r#"<a:accent{}><a:srgbClr val="{color}"/></a:accent{}>"#, n + 1, n + 1);
    }
    let font = |kind: &str| {
        format!(r#"<a:{kind}><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:{kind}>"#)
    };
    let solid = r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#;
    let line = r#"<a:ln w="9525"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>"#;
    let effect = "<a:effectStyle><a:effectLst/></a:effectStyle>";
    format!(
        r#"{XML_DECL}<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="{name}"><a:themeElements><a:clrScheme name="{name}"><a:dk1><a:srgbClr val="000000"/></a:dk1><a:lt1><a:srgbClr val="FFFFFF"/></a:lt1><a:dk2><a:srgbClr val="1F2937"/></a:dk2><a:lt2><a:srgbClr val="F3F4F6"/></a:lt2>{accents}<a:hlink><a:srgbClr val="2563EB"/></a:hlink><a:folHlink><a:srgbClr val="7C3AED"/></a:folHlink></a:clrScheme><a:fontScheme name="{name}">{major}{minor}</a:fontScheme><a:fmtScheme name="{name}"><a:fillStyleLst>{solid}{solid}{solid}</a:fillStyleLst><a:lnStyleLst>{line}{line}{line}</a:lnStyleLst><a:effectStyleLst>{effect}{effect}{effect}</a:effectStyleLst><a:bgFillStyleLst>{solid}{solid}{solid}</a:bgFillStyleLst></a:fmtScheme></a:themeElements></a:theme>"#,
        name = escape(&deck.theme),
        major = font("majorFont"),
        minor = font("minorFont"),
    )
}

const MASTER: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sldMaster {NS}><p:cSld>"#,
    r#"<p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree>"#,
    r#"</p:cSld><p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/>"#,
    r#"<p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst></p:sldMaster>"#
);

const LAYOUT: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sldLayout {NS} type="blank" preserve="1"><p:cSld name="Blank">"#,
    r#"<p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree>"#,
    r#"</p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::packager::{SlideLayout, SLIDE_HEIGHT, SLIDE_WIDTH};
    use std::io::Read;

    fn deck(picture: &Path) -> SlideDeck {
        SlideDeck {
            title: "FleetFix".to_string(),
            theme: "professional".to_string(),
            palette: vec!["#1e3a8a".to_string()],
            width: SLIDE_WIDTH,
            height: SLIDE_HEIGHT,
            slides: vec![
                Slide {
                    index: 0,
                    layout: SlideLayout::Title,
                    shapes: vec![
                        Shape::Background { fill: "#0F172A".to_string() },
                        Shape::Text {
                            x: 0.8,
                            y: 2.6,
                            w: 11.7,
                            h: 1.6,
                            text: "Fleets & <downtime>".to_string(),
                            font: "Helvetica".to_string(),
                            size: 44.0,
                            color: "#FFFFFF".to_string(),
                            bold: true,
                        },
                    ],
                    notes: String::new(),
                },
                Slide {
                    index: 1,
                    layout: SlideLayout::BulletsWithChart,
                    shapes: vec![
                        Shape::Bullets {
                            x: 0.8,
                            y: 1.7,
                            w: 6.2,
                            h: 5.1,
                            items: vec!["Downtime".to_string(), "Parts".to_string()],
                            font: "Helvetica".to_string(),
                            size: 20.0,
                            color: "#111111".to_string(),
                        },
                        Shape::Picture {
                            x: 7.3,
                            y: 1.7,
                            w: 5.4,
                            h: 4.6,
                            path: picture.display().to_string(),
                        },
                        Shape::Picture {
                            x: 7.3,
                            y: 1.7,
                            w: 5.4,
                            h: 4.6,
                            path: "/nowhere/missing.png".to_string(),
                        },
                    ],
                    notes: "pain".to_string(),
                },
            ],
        }
    }

    fn entry(archive: &mut zip::ZipArchive<std::fs::File>, name: &str) -> String {
        let mut text = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn writes_an_openable_presentation_package() {
        let dir = tempfile::tempdir().unwrap();
        let chart = dir.path().join("chart.svg");
        std::fs::write(&chart, "<svg/>").unwrap();
        let path = dir.path().join("deck.pptx");
        PptxPackager.package(&deck(&chart), &path).unwrap();

        let mut archive = zip::ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
        for name in [
            "[Content_Types].xml",
            "_rels/.rels",
            "ppt/presentation.xml",
            "ppt/slideMasters/slideMaster1.xml",
            "ppt/slideLayouts/slideLayout1.xml",
            "ppt/theme/theme1.xml",
            "ppt/slides/slide1.xml",
            "ppt/slides/slide2.xml",
            "ppt/media/image1.svg",
        ] {
            assert!(archive.by_name(name).is_ok(), "{name}");
        }
        assert!(archive.by_name("ppt/media/image2.png").is_err());

        let presentation = entry(&mut archive, "ppt/presentation.xml");
        assert!(presentation.contains(r#"<p:sldSz cx="12191695" cy="6858000"/>"#));
        assert_eq!(presentation.matches("<p:sldId ").count(), 2);

        let title = entry(&mut archive, "ppt/slides/slide1.xml");
        assert!(title.contains("Fleets &amp; &lt;downtime&gt;"));
        assert!(title.contains(r#"<a:srgbClr val="0F172A"/>"#));
        assert!(title.contains(r#"sz="4400" b="1""#));

        let body = entry(&mut archive, "ppt/slides/slide2.xml");
        assert_eq!(body.matches("<a:buChar").count(), 2);
        assert_eq!(body.matches("<p:pic>").count(), 1);
        let body_rels = entry(&mut archive, "ppt/slides/_rels/slide2.xml.rels");
        assert!(body_rels.contains(r#"Id="rId2""#) && body_rels.contains("../media/image1.svg"));

        let theme = entry(&mut archive, "ppt/theme/theme1.xml");
        assert!(theme.contains(r#"<a:accent1><a:srgbClr val="1E3A8A"/></a:accent1>"#));
    }

    #[test]
    fn colors_and_sizes_convert_to_drawingml_units() {
        assert_eq!(srgb("#abcdef"), "ABCDEF");
        assert_eq!(srgb("red"), "000000");
        assert_eq!(emu(1.0), 914_400);
        assert_eq!(image_extension(Path::new("a.JPG")), Some("jpeg"));
        assert_eq!(image_extension(Path::new("a.bmp")), None);
        assert_eq!(escape("a\u{1}b\"c"), "ab&quot;c");
    }
}
