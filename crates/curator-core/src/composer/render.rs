//! Renderer seam and the built-in HTML renderer.

use std::fmt::Write as _;

use serde::Serialize;

use super::ComposeError;

/// One item as the renderer sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderItem {
    pub title: String,
    pub link: String,
    pub source: String,
    pub summary: String,
    pub read_time_minutes: u32,
    pub category_tag: String,
}

/// Full-tier items under one category heading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderSection {
    pub category: String,
    pub items: Vec<RenderItem>,
}

/// Named fields handed to a [`Renderer`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderContext {
    pub newsletter_name: String,
    pub segment_name: String,
    pub segment_description: String,
    pub iso_date: String,
    pub long_date: String,
    pub sections: Vec<RenderSection>,
    pub quick_links: Vec<RenderItem>,
    pub trending: Vec<RenderItem>,
    /// Raw pool size; 0 when unknown and then omitted.
    pub items_scanned: usize,
    pub items_selected: usize,
    pub website_url: String,
    pub unsubscribe_url: String,
}

/// Turns named fields into the serialized artifact body.
pub trait Renderer: Send + Sync {
    fn render(&self, context: &RenderContext) -> Result<String, ComposeError>;
}

/// Minimal, dependency-free HTML email layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn render(&self, ctx: &RenderContext) -> Result<String, ComposeError> {
        let mut out = String::with_capacity(8 * 1024);
        write_document(&mut out, ctx).map_err(|e| ComposeError::Render(e.to_string()))?;
        Ok(out)
    }
}

fn write_document(out: &mut String, ctx: &RenderContext) -> std::fmt::Result {
    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html lang=\"en\">")?;
    writeln!(out, "<head>")?;
    writeln!(out, "<meta charset=\"utf-8\">")?;
    writeln!(
        out,
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">"
    )?;
    writeln!(
        out,
        "<title>{} | {} | {}</title>",
        escape(&ctx.newsletter_name),
        escape(&ctx.segment_name),
        escape(&ctx.iso_date)
    )?;
    writeln!(out, "</head>")?;
    writeln!(
        out,
        "<body style=\"margin:0;padding:0;font-family:Helvetica,Arial,sans-serif;color:#1a1a1a;\">"
    )?;
    writeln!(
        out,
        "<table role=\"presentation\" width=\"100%\" cellpadding=\"0\" cellspacing=\"0\"><tr><td style=\"max-width:640px;padding:24px;\">"
    )?;

    writeln!(out, "<header>")?;
    writeln!(
        out,
        "<h1 style=\"margin:0 0 4px;\">{}</h1>",
        escape(&ctx.newsletter_name)
    )?;
    writeln!(
        out,
        "<p style=\"margin:0;font-size:14px;\">{} &middot; <time datetime=\"{}\">{}</time></p>",
        escape(&ctx.segment_name),
        escape(&ctx.iso_date),
        escape(&ctx.long_date)
    )?;
    if !ctx.segment_description.is_empty() {
        writeln!(
            out,
            "<p style=\"margin:8px 0 0;font-size:13px;color:#555;\">{}</p>",
            escape(&ctx.segment_description)
        )?;
    }
    writeln!(out, "</header>")?;

    for section in &ctx.sections {
        writeln!(out, "<section>")?;
        writeln!(
            out,
            "<h2 style=\"font-size:18px;margin:28px 0 8px;\">{}</h2>",
            escape(&section.category)
        )?;
        for item in &section.items {
            write_full_item(out, item)?;
        }
        writeln!(out, "</section>")?;
    }

    if !ctx.quick_links.is_empty() {
        writeln!(out, "<section>")?;
        writeln!(
            out,
            "<h2 style=\"font-size:18px;margin:28px 0 8px;\">⚡ Quick Links</h2>"
        )?;
        writeln!(out, "<ul style=\"padding-left:18px;\">")?;
        for item in &ctx.quick_links {
            write_list_item(out, item)?;
        }
        writeln!(out, "</ul>")?;
        writeln!(out, "</section>")?;
    }

    if !ctx.trending.is_empty() {
        writeln!(out, "<section>")?;
        writeln!(
            out,
            "<h2 style=\"font-size:18px;margin:28px 0 8px;\">🔥 Worth Your Attention</h2>"
        )?;
        writeln!(out, "<ul style=\"padding-left:18px;\">")?;
        for item in &ctx.trending {
            write_list_item(out, item)?;
        }
        writeln!(out, "</ul>")?;
        writeln!(out, "</section>")?;
    }

    writeln!(
        out,
        "<footer style=\"margin-top:32px;font-size:12px;color:#777;\">"
    )?;
    if ctx.items_scanned > 0 {
        writeln!(
            out,
            "<p>{} items scanned, {} selected for you.</p>",
            ctx.items_scanned, ctx.items_selected
        )?;
    } else {
        writeln!(out, "<p>{} items selected for you.</p>", ctx.items_selected)?;
    }
    writeln!(
        out,
        "<p>You are receiving {} because you subscribed at <a href=\"{}\">{}</a>.</p>",
        escape(&ctx.newsletter_name),
        escape(&ctx.website_url),
        escape(&ctx.website_url)
    )?;
    writeln!(
        out,
        "<p><a href=\"{}\">Unsubscribe</a></p>",
        escape(&ctx.unsubscribe_url)
    )?;
    writeln!(
        out,
        "<p>&copy; {} &middot; {}</p>",
        escape(&ctx.newsletter_name),
        escape(&ctx.iso_date)
    )?;
    writeln!(out, "</footer>")?;

    writeln!(out, "</td></tr></table>")?;
    writeln!(out, "</body>")?;
    writeln!(out, "</html>")?;
    Ok(())
}

fn write_full_item(out: &mut String, item: &RenderItem) -> std::fmt::Result {
    writeln!(out, "<article style=\"margin:0 0 20px;\">")?;
    writeln!(
        out,
        "<h3 style=\"font-size:16px;margin:0 0 4px;\"><a href=\"{}\">{}</a></h3>",
        escape(&item.link),
        escape(&item.title)
    )?;
    writeln!(
        out,
        "<p style=\"margin:0 0 6px;font-size:12px;color:#777;\">{} &middot; {} min read</p>",
        escape(&item.source),
        item.read_time_minutes
    )?;
    writeln!(out, "<p style=\"margin:0;\">{}</p>", escape(&item.summary))?;
    writeln!(out, "</article>")
}

fn write_list_item(out: &mut String, item: &RenderItem) -> std::fmt::Result {
    write!(
        out,
        "<li style=\"margin:0 0 8px;\"><a href=\"{}\">{}</a>",
        escape(&item.link),
        escape(&item.title)
    )?;
    if !item.summary.is_empty() {
        write!(out, " &ndash; {}", escape(&item.summary))?;
    }
    writeln!(out, " <span style=\"color:#777;\">({} min)</span></li>", item.read_time_minutes)
}

/// Escape text for HTML content and double-quoted attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
        assert_eq!(escape("{{ name }}"), "{{ name }}");
    }

    #[test]
    fn test_scanned_count_omitted_when_unknown() {
        let ctx = RenderContext {
            newsletter_name: "Brief Delights".into(),
            segment_name: "Builders".into(),
            segment_description: String::new(),
            iso_date: "2026-10-18".into(),
            long_date: "October 18, 2026".into(),
            sections: Vec::new(),
            quick_links: Vec::new(),
            trending: Vec::new(),
            items_scanned: 0,
            items_selected: 3,
            website_url: "https://brief.delights.pro".into(),
            unsubscribe_url: "mailto:hello@brief.delights.pro?subject=Unsubscribe".into(),
        };
        let html = HtmlRenderer.render(&ctx).expect("render");
        assert!(!html.contains("scanned"));
        assert!(html.contains("3 items selected"));
        assert!(html.contains("<time datetime=\"2026-10-18\">October 18, 2026</time>"));
    }
}
