//! 文字层：把收集到的文字拼成一份 SVG，由 usvg 排版、resvg 栅格化到同一画布。

use std::fmt::Write as _;

use cadview_engine::resolver::TextAnchor;
use tiny_skia::Transform;

use crate::canvas::Canvas;
use crate::errors::RenderError;
use crate::fonts::FontSelection;
use crate::palette::Rgb;

const LINE_SPACING: f64 = 1.2;

/// 一段已换算到像素坐标的文字。
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TextRun {
    pub x: f64,
    pub y: f64,
    pub font_px: f64,
    /// 世界坐标中的逆时针旋转角（弧度）。
    pub rotation: f64,
    pub anchor: TextAnchor,
    pub color: Rgb,
    pub lines: Vec<String>,
}

pub(crate) fn draw_text_layer(
    canvas: &mut Canvas,
    runs: &[TextRun],
    fonts: &FontSelection,
) -> Result<(), RenderError> {
    let svg = build_svg(canvas.width(), canvas.height(), runs, fonts.family());
    let mut options = usvg::Options {
        fontdb: fonts.database(),
        ..usvg::Options::default()
    };
    if let Some(family) = fonts.family() {
        options.font_family = family.to_string();
    }
    let tree = usvg::Tree::from_str(&svg, &options)
        .map_err(|err| RenderError::Backend(format!("text layer rejected: {err}")))?;
    resvg::render(&tree, Transform::identity(), &mut canvas.pixmap_mut().as_mut());
    Ok(())
}

pub(crate) fn build_svg(width: u32, height: u32, runs: &[TextRun], family: Option<&str>) -> String {
    let mut svg = String::with_capacity(256 + runs.len() * 160);
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );
    let family_attr = family
        .map(|name| format!(r#" font-family="{}""#, escape_xml(name)))
        .unwrap_or_default();

    for run in runs {
        let baseline = match run.anchor {
            TextAnchor::Baseline => "",
            TextAnchor::Top => r#" dominant-baseline="text-before-edge""#,
        };
        let degrees = -run.rotation.to_degrees();
        let transform = if degrees.abs() > f64::EPSILON {
            format!(r#" transform="rotate({degrees:.4} {:.3} {:.3})""#, run.x, run.y)
        } else {
            String::new()
        };
        let _ = write!(
            svg,
            r#"<text x="{:.3}" y="{:.3}" font-size="{:.3}" fill="{}"{family_attr}{baseline}{transform} xml:space="preserve">"#,
            run.x,
            run.y,
            run.font_px,
            run.color.hex(),
        );
        for (index, line) in run.lines.iter().enumerate() {
            if index == 0 {
                let _ = write!(svg, r#"<tspan x="{:.3}">"#, run.x);
            } else {
                let _ = write!(
                    svg,
                    r#"<tspan x="{:.3}" dy="{:.3}">"#,
                    run.x,
                    run.font_px * LINE_SPACING
                );
            }
            svg.push_str(&escape_xml(line));
            svg.push_str("</tspan>");
        }
        svg.push_str("</text>");
    }
    svg.push_str("</svg>");
    svg
}

/// XML 转义，同时去掉 XML 1.0 不允许的控制字符。
fn escape_xml(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\t' => escaped.push(' '),
            ch if ch.is_control() => {}
            ch => escaped.push(ch),
        }
    }
    escaped
}
