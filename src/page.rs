//! Server-rendered HTML for the chat UI.
//!
//! The page is rebuilt from scratch on every request: chat history on the
//! right, file management sidebar on the left. Assistant turns are Markdown
//! rendered with `pulldown-cmark`; raw HTML inside them is shown as text
//! and link or image targets outside `http`, `https` and `mailto` (or
//! relative) are replaced.

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};

use crate::extensions::UPLOAD_EXTENSIONS;
use crate::files::ListedFile;
use crate::models::{ChatTurn, Role};
use crate::session::{Notice, NoticeKind};

pub const PAGE_TITLE: &str = "Company RAG Assistant";

pub struct PageView<'a> {
    pub history: &'a [ChatTurn],
    pub files: &'a [ListedFile],
    pub notice: Option<&'a Notice>,
}

pub fn escape_html(text: &str) -> String {
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

/// True for relative URLs and the `http`, `https` and `mailto` schemes.
fn is_safe_url(url: &str) -> bool {
    let url = url.trim();
    match url.find([':', '/', '?', '#']) {
        Some(i) if url[i..].starts_with(':') => matches!(
            url[..i].to_ascii_lowercase().as_str(),
            "http" | "https" | "mailto"
        ),
        _ => true,
    }
}

pub fn render_markdown(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(text, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) if !is_safe_url(&dest_url) => Event::Start(Tag::Link {
            link_type,
            dest_url: CowStr::Borrowed("#"),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) if !is_safe_url(&dest_url) => Event::Start(Tag::Image {
            link_type,
            dest_url: CowStr::Borrowed(""),
            title,
            id,
        }),
        other => other,
    });
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

fn render_turn(turn: &ChatTurn) -> String {
    let body = match turn.role {
        Role::User => format!("<p>{}</p>", escape_html(&turn.content)),
        Role::Assistant => render_markdown(&turn.content),
    };
    format!(
        "<div class=\"turn {role}\"><div class=\"who\">{role}</div>{body}</div>\n",
        role = turn.role.as_str(),
        body = body
    )
}

fn render_sidebar(files: &[ListedFile]) -> String {
    let mut out = String::from("<aside>\n<h2>Indexed files</h2>\n");

    if files.is_empty() {
        out.push_str("<p class=\"muted\">No files in the vector store.</p>\n");
    } else {
        out.push_str("<ul class=\"files\">\n");
        for file in files {
            out.push_str(&format!(
                "<li>{} <span class=\"muted\">({} KB)</span></li>\n",
                escape_html(&file.filename),
                file.bytes.div_ceil(1024)
            ));
        }
        out.push_str("</ul>\n");
    }

    out.push_str(&format!(
        "<h2>Upload</h2>\n<form method=\"post\" action=\"/files/upload\" enctype=\"multipart/form-data\">\n\
         <input type=\"file\" name=\"files\" multiple accept=\"{}\">\n\
         <button type=\"submit\">Upload</button>\n</form>\n",
        UPLOAD_EXTENSIONS.join(",")
    ));

    if !files.is_empty() {
        out.push_str("<h2>Delete</h2>\n<form method=\"post\" action=\"/files/delete\">\n<select name=\"file_id\">\n");
        for file in files {
            out.push_str(&format!(
                "<option value=\"{}\">{}</option>\n",
                escape_html(&file.id),
                escape_html(&file.filename)
            ));
        }
        out.push_str("</select>\n<button type=\"submit\">Delete</button>\n</form>\n");
    }

    out.push_str(
        "<form method=\"post\" action=\"/session/reset\"><button type=\"submit\">New conversation</button></form>\n</aside>\n",
    );
    out
}

fn render_notice(notice: &Notice) -> String {
    let class = match notice.kind {
        NoticeKind::Success => "notice ok",
        NoticeKind::Error => "notice err",
    };
    format!("<div class=\"{}\">{}</div>\n", class, escape_html(&notice.text))
}

pub fn render_page(view: &PageView<'_>) -> String {
    let history: String = view.history.iter().map(render_turn).collect();
    let notice = view.notice.map(render_notice).unwrap_or_default();
    let sidebar = render_sidebar(view.files);

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{style}</style>\n</head>\n<body>\n{sidebar}\
         <main>\n<h1>&#128196; Ask Your Company Documents</h1>\n{notice}\
         <section class=\"history\">\n{history}</section>\n\
         <form class=\"chat\" method=\"post\" action=\"/chat\">\n\
         <input type=\"text\" name=\"message\" placeholder=\"Ask your question...\" autofocus required>\n\
         <button type=\"submit\">Send</button>\n</form>\n</main>\n</body>\n</html>\n",
        title = PAGE_TITLE,
        style = STYLE,
        sidebar = sidebar,
        notice = notice,
        history = history,
    )
}

pub fn render_error(heading: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{style}</style>\n</head>\n<body>\n<main>\n\
         <h1>{heading}</h1>\n<p>{message}</p>\n<p><a href=\"/\">Back to chat</a></p>\n</main>\n</body>\n</html>\n",
        title = PAGE_TITLE,
        style = STYLE,
        heading = escape_html(heading),
        message = escape_html(message),
    )
}

const STYLE: &str = "body{display:flex;margin:0;font-family:sans-serif}\
aside{width:18rem;padding:1rem;background:#f4f4f6;min-height:100vh}\
main{flex:1;padding:1rem 2rem;max-width:60rem}\
.turn{margin:.75rem 0;padding:.5rem .75rem;border-radius:6px}\
.turn.user{background:#eef3ff}.turn.assistant{background:#f7f7f7}\
.who{font-size:.75rem;text-transform:uppercase;color:#666}\
.muted{color:#777}.notice{padding:.5rem;border-radius:4px;margin:.5rem 0}\
.notice.ok{background:#e6f6e6}.notice.err{background:#fde8e8}\
form.chat{display:flex;gap:.5rem;margin-top:1rem}form.chat input{flex:1;padding:.5rem}";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("<b>\"a\" & 'b'</b>"),
            "&lt;b&gt;&quot;a&quot; &amp; &#39;b&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn markdown_renders_but_raw_html_does_not() {
        let html = render_markdown("**bold** <script>alert(1)</script>");
        assert!(html.contains("<strong>bold</strong>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn script_links_and_images_are_neutralized() {
        let html = render_markdown(
            "[click](javascript:alert(document.cookie)) ![x](JavaScript:alert(2)) \
             [data](data:text/html,hi) [ok](https://example.com/a) [rel](/files?x=1) \
             [mail](mailto:help@example.com)",
        );
        assert!(!html.to_ascii_lowercase().contains("javascript:"));
        assert!(!html.contains("data:text"));
        assert!(html.contains("<a href=\"#\">click</a>"));
        assert!(html.contains("href=\"https://example.com/a\""));
        assert!(html.contains("href=\"/files?x=1\""));
        assert!(html.contains("href=\"mailto:help@example.com\""));
    }

    #[test]
    fn url_scheme_check() {
        assert!(is_safe_url("https://example.com"));
        assert!(is_safe_url("HTTP://example.com"));
        assert!(is_safe_url("docs/policy.md#refunds"));
        assert!(is_safe_url("/a:b"));
        assert!(!is_safe_url(" javascript:alert(1)"));
        assert!(!is_safe_url("vbscript:x"));
        assert!(!is_safe_url("java\tscript:x"));
    }

    #[test]
    fn page_lists_history_and_files() {
        let history = vec![
            ChatTurn::user("What is <the> refund policy?"),
            ChatTurn::assistant("Refunds take *14* days."),
        ];
        let files = vec![ListedFile {
            id: "file_1".to_string(),
            filename: "policy.pdf".to_string(),
            bytes: 2048,
        }];
        let notice = Notice {
            kind: NoticeKind::Success,
            text: "Uploaded policy.pdf".to_string(),
        };
        let page = render_page(&PageView {
            history: &history,
            files: &files,
            notice: Some(&notice),
        });

        assert!(page.contains("What is &lt;the&gt; refund policy?"));
        assert!(page.contains("<em>14</em>"));
        assert!(page.contains("<option value=\"file_1\">policy.pdf</option>"));
        assert!(page.contains("notice ok"));
        let user_at = page.find("turn user").unwrap();
        let assistant_at = page.find("turn assistant").unwrap();
        assert!(user_at < assistant_at);
    }

    #[test]
    fn empty_store_hides_delete_form() {
        let page = render_page(&PageView {
            history: &[],
            files: &[],
            notice: None,
        });
        assert!(page.contains("No files in the vector store."));
        assert!(!page.contains("action=\"/files/delete\""));
    }
}
