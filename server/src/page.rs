use ripweb_protocol::{DisplayItem, MediaType};
use std::fmt::Write;

// Everything the index page can show. Any of it may be missing.
#[derive(Debug, Default)]
pub struct Page<'a> {
    pub items: &'a [DisplayItem],
    pub search_type: MediaType,
    pub query: Option<&'a str>,
    pub search_output: Option<&'a str>,
    pub download_output: Option<&'a str>,
}

const STYLE: &str = include_str!("../static/style.css");

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn checked(page: &Page<'_>, media_type: MediaType) -> &'static str {
    if page.search_type == media_type {
        " checked"
    } else {
        ""
    }
}

// RUST-WART write! into a String can't fail, but the signature still says it can.
pub fn render(page: &Page<'_>) -> String {
    let mut html = String::new();
    let _ = write_page(&mut html, page);
    html
}

fn write_page(html: &mut String, page: &Page<'_>) -> std::fmt::Result {
    write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>ripweb</title>
<style>{style}</style>
</head>
<body>
<h1>Search</h1>
<form method="post" action="/">
<label><input type="radio" name="search_type" value="track"{track_checked}> Tracks</label>
<label><input type="radio" name="search_type" value="album"{album_checked}> Albums</label>
<input type="text" name="text_input" value="{query}" placeholder="Title, artist, ..." autofocus>
<button type="submit">Search</button>
</form>
"#,
        style = STYLE,
        track_checked = checked(page, MediaType::Track),
        album_checked = checked(page, MediaType::Album),
        query = escape(page.query.unwrap_or("")),
    )?;

    if let Some(output) = page.search_output {
        writeln!(
            html,
            r#"<pre class="status search-output">{}</pre>"#,
            escape(output)
        )?;
    }
    if let Some(output) = page.download_output {
        writeln!(
            html,
            r#"<h2>Download</h2>
<pre class="status download-output">{}</pre>"#,
            escape(output)
        )?;
    }

    if !page.items.is_empty() {
        writeln!(
            html,
            r#"<h2>Results</h2>
<table>
<thead><tr><th>Title</th><th>Artist</th><th>Type</th><th></th></tr></thead>
<tbody>"#
        )?;
        for item in page.items {
            writeln!(
                html,
                r#"<tr><td>{title}</td><td>{artist}</td><td>{media_type}</td><td><form method="post" action="/download_item"><input type="hidden" name="item_id" value="{id}"><input type="hidden" name="item_type" value="{media_type}"><button type="submit">Download</button></form></td></tr>"#,
                title = escape(&item.title),
                artist = escape(&item.artist),
                media_type = item.media_type,
                id = escape(&item.id),
            )?;
        }
        writeln!(html, "</tbody>\n</table>")?;
    }

    writeln!(html, "</body>\n</html>")
}
