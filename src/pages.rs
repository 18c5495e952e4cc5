//! Server-rendered HTML pages.
//!
//! Pages are plain strings built with `format!`; every value that came from
//! the database or the request goes through [`escape`].

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Form,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::collections;
use crate::error::AppError;
use crate::files;
use crate::handlers::{self, encode_segment, found};
use crate::links;
use crate::models::{FileUpload, Link, NewLink, SlugSuggestion};
use crate::state::AppState;

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

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{} · Atalho</title>\n</head>\n<body>\n\
         <nav><a href=\"/\">Links</a> | <a href=\"/files\">Files</a></nav>\n\
         <main>\n{}\n</main>\n</body>\n</html>\n",
        escape(title),
        body
    )
}

fn page(status: StatusCode, title: &str, body: &str) -> Response {
    (status, Html(layout(title, body))).into_response()
}

fn error_page(err: &AppError) -> Response {
    let body = format!(
        "<h1>Something went wrong</h1>\n<p>{}</p>\n<p><a href=\"/\">Back to start</a></p>",
        escape(&err.client_message())
    );
    page(err.status(), "Error", &body)
}

fn not_found_page(what: &str) -> Response {
    let body = format!(
        "<h1>Not found</h1>\n<p>{}</p>\n<p><a href=\"/\">Back to start</a></p>",
        escape(what)
    );
    page(StatusCode::NOT_FOUND, "Not found", &body)
}

/// Human readable byte count, e.g. `10.0 MB`.
pub fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes.max(0))
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M").to_string()
}

const UPLOAD_FORM: &str = "<section>\n<h2>Share a file</h2>\n\
    <form action=\"/files\" method=\"post\" enctype=\"multipart/form-data\">\n\
    <input name=\"file\" type=\"file\" required>\n\
    <label>Expires <input name=\"expiresAt\" placeholder=\"2030-01-01T00:00:00Z\"></label>\n\
    <button type=\"submit\">Upload</button>\n\
    </form>\n</section>";

/// Fields of the home page link form. `action` is `suggest` for the
/// suggestion button and anything else saves.
#[derive(Debug, Default, Deserialize)]
pub struct LinkForm {
    #[serde(default)]
    url: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    action: String,
}

enum Notice {
    Saved(String),
    Failed(String),
}

#[derive(Default)]
struct HomeView {
    form: LinkForm,
    notice: Option<Notice>,
    suggestions: Vec<SlugSuggestion>,
    links: Vec<Link>,
}

fn render_home(view: &HomeView) -> String {
    let mut body = String::from(
        "<h1>Atalho</h1>\n<p>Short, memorable slugs for the links you use every day.</p>\n",
    );
    match &view.notice {
        Some(Notice::Saved(slug)) => body.push_str(&format!(
            "<p class=\"notice\">Saved <a href=\"/slug/{}\">{}</a>.</p>\n",
            escape(&encode_segment(slug)),
            escape(slug)
        )),
        Some(Notice::Failed(message)) => {
            body.push_str(&format!("<p class=\"error\">{}</p>\n", escape(message)))
        }
        None => {}
    }

    body.push_str(&format!(
        "<section>\n<h2>New link</h2>\n\
         <form id=\"new-link\" action=\"/\" method=\"post\">\n\
         <label>URL <input name=\"url\" type=\"url\" value=\"{}\" required></label>\n\
         <label>Slug <input name=\"slug\" value=\"{}\" pattern=\"[A-Za-z0-9_-]+\"></label>\n\
         <label>Title <input name=\"title\" value=\"{}\"></label>\n\
         <button type=\"submit\" name=\"action\" value=\"save\">Save</button>\n\
         <button type=\"submit\" name=\"action\" value=\"suggest\" formnovalidate>Suggest slugs</button>\n\
         </form>\n",
        escape(&view.form.url),
        escape(&view.form.slug),
        escape(&view.form.title),
    ));
    if !view.suggestions.is_empty() {
        body.push_str("<ul class=\"suggestions\">\n");
        for suggestion in &view.suggestions {
            body.push_str(&format!(
                "<li><form action=\"/\" method=\"post\">\
                 <input type=\"hidden\" name=\"url\" value=\"{}\">\
                 <input type=\"hidden\" name=\"title\" value=\"{}\">\
                 <input type=\"hidden\" name=\"slug\" value=\"{}\">\
                 <code>{}</code> {} <button type=\"submit\" name=\"action\" value=\"save\">Use</button>\
                 </form></li>\n",
                escape(&view.form.url),
                escape(&view.form.title),
                escape(&suggestion.slug),
                escape(&suggestion.slug),
                escape(suggestion.description.as_deref().unwrap_or_default()),
            ));
        }
        body.push_str("</ul>\n");
    }
    body.push_str("</section>\n");

    if !view.links.is_empty() {
        body.push_str("<section>\n<h2>Your links</h2>\n<ul>\n");
        for link in &view.links {
            body.push_str(&format!(
                "<li><a href=\"/slug/{}\">{}</a> {}</li>\n",
                escape(&encode_segment(&link.slug)),
                escape(&link.slug),
                escape(link.title.as_deref().unwrap_or(&link.url)),
            ));
        }
        body.push_str("</ul>\n</section>\n");
    }

    body.push_str(UPLOAD_FORM);
    layout("Links", &body)
}

/// Saved links for the home page; an unconfigured or failing database
/// leaves the list empty so the forms still render.
async fn saved_links(state: &AppState) -> Vec<Link> {
    let Ok(db) = state.db() else {
        return Vec::new();
    };
    match links::list_links(db).await {
        Ok(links) => links,
        Err(e) => {
            tracing::warn!(error = %e, "could not list links for home page");
            Vec::new()
        }
    }
}

pub async fn home(State(state): State<AppState>) -> Html<String> {
    let view = HomeView {
        links: saved_links(&state).await,
        ..HomeView::default()
    };
    Html(render_home(&view))
}

/// Handles both buttons of the link form and renders the page again with
/// the outcome.
pub async fn submit_link(State(state): State<AppState>, Form(mut form): Form<LinkForm>) -> Response {
    let mut view = HomeView::default();
    let status = if form.action == "suggest" {
        if form.url.trim().is_empty() {
            view.notice = Some(Notice::Failed("Enter a URL to get suggestions".to_string()));
            StatusCode::BAD_REQUEST
        } else {
            let outcome = state.suggestions.suggest(form.url.trim()).await;
            if form.slug.trim().is_empty() {
                if let Some(first) = outcome.suggestions.first() {
                    form.slug = first.slug.clone();
                }
            }
            view.suggestions = outcome.suggestions;
            StatusCode::OK
        }
    } else {
        let link = NewLink {
            id: None,
            url: form.url.clone(),
            slug: form.slug.clone(),
            title: Some(form.title.clone()),
            created_at: None,
        }
        .into_link();
        let saved = match state.db() {
            Ok(db) => links::save_link(db, &link).await,
            Err(e) => Err(e),
        };
        match saved {
            Ok(link) => {
                view.notice = Some(Notice::Saved(link.slug));
                form = LinkForm::default();
                StatusCode::CREATED
            }
            Err(e) => {
                view.notice = Some(Notice::Failed(e.client_message()));
                e.status()
            }
        }
    };
    view.form = form;
    view.links = saved_links(&state).await;
    (status, Html(render_home(&view))).into_response()
}

/// Upload from the HTML form; shows the download link instead of the JSON
/// envelope.
pub async fn upload_page(State(state): State<AppState>, multipart: Multipart) -> Response {
    match handlers::files::store_upload(&state, multipart).await {
        Ok(file) => {
            let url = handlers::files::download_url(&state, &file.download_slug);
            let body = format!(
                "<h1>Upload complete</h1>\n<p><strong>{}</strong> ({})</p>\n\
                 <p>Share this link: <a href=\"{}\">{}</a></p>\n{}",
                escape(&file.original_name),
                format_size(file.size),
                escape(&url),
                escape(&url),
                UPLOAD_FORM,
            );
            page(StatusCode::CREATED, "Uploaded", &body)
        }
        Err(e) => {
            let body = format!(
                "<h1>Upload failed</h1>\n<p class=\"error\">{}</p>\n{}",
                escape(&e.client_message()),
                UPLOAD_FORM,
            );
            page(e.status(), "Upload failed", &body)
        }
    }
}

fn file_row(file: &FileUpload) -> String {
    format!(
        "<tr><td>{}</td><td>{}</td><td>{}</td><td><a href=\"/download/{}\">{}</a></td><td>{}</td></tr>\n",
        escape(&file.original_name),
        format_size(file.size),
        file.download_count,
        escape(&file.download_slug),
        escape(&file.download_slug),
        format_date(&file.created_at),
    )
}

pub async fn files_page(State(state): State<AppState>) -> Response {
    let db = match state.db() {
        Ok(db) => db,
        Err(e) => return error_page(&e),
    };
    let listed = match files::list_files(db).await {
        Ok(listed) => listed,
        Err(e) => return error_page(&e),
    };
    let stats = files::file_stats(&listed, Utc::now());

    let mut body = format!(
        "<h1>Files</h1>\n<p>{} files, {}, {} downloads, {} uploaded this week</p>\n",
        stats.total_files,
        format_size(stats.total_size),
        stats.total_downloads,
        stats.recent_uploads
    );
    if listed.is_empty() {
        body.push_str("<p>No files uploaded yet.</p>");
    } else {
        body.push_str("<table>\n<tr><th>Name</th><th>Size</th><th>Downloads</th><th>Link</th><th>Uploaded</th></tr>\n");
        for file in &listed {
            body.push_str(&file_row(file));
        }
        body.push_str("</table>\n");
    }
    body.push_str(UPLOAD_FORM);
    page(StatusCode::OK, "Files", &body)
}

pub async fn collection_page(State(state): State<AppState>, Path(access_key): Path<String>) -> Response {
    let db = match state.db() {
        Ok(db) => db,
        Err(e) => return error_page(&e),
    };
    let collection = match collections::import_collection(db, &access_key).await {
        Ok(collection) => collection,
        Err(AppError::NotFound(_)) => return not_found_page("This collection does not exist."),
        Err(e) => return error_page(&e),
    };

    let mut body = format!(
        "<h1>{}</h1>\n<p>{} shared links</p>\n<ul>\n",
        escape(&collection.collection_name),
        collection.links.len()
    );
    for link in &collection.links {
        body.push_str(&format!(
            "<li><a href=\"{}\" rel=\"noopener\">{}</a> <code>{}</code></li>\n",
            escape(&link.url),
            escape(link.title.as_deref().unwrap_or(&link.url)),
            escape(&link.slug),
        ));
    }
    body.push_str("</ul>");
    page(StatusCode::OK, &collection.collection_name, &body)
}

pub async fn slug_page(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    let db = match state.db() {
        Ok(db) => db,
        Err(e) => return error_page(&e),
    };
    match links::get_link_by_slug(db, &slug).await {
        Ok(link) => found(&link.url),
        Err(AppError::NotFound(_)) => not_found_page(&format!("No link uses the slug \"{slug}\".")),
        Err(e) => error_page(&e),
    }
}

pub async fn download_success_page(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    let db = match state.db() {
        Ok(db) => db,
        Err(e) => return error_page(&e),
    };
    match files::find_by_slug(db, &slug).await {
        Ok(file) => {
            let body = format!(
                "<h1>Download started</h1>\n<p><strong>{}</strong> ({})</p>\n\
                 <p>Downloaded {} times.</p>\n<p><a href=\"/download/{}\">Download again</a></p>",
                escape(&file.original_name),
                format_size(file.size),
                file.download_count,
                escape(&file.download_slug),
            );
            page(StatusCode::OK, "Download", &body)
        }
        Err(AppError::NotFound(_)) => not_found_page("This file does not exist or was removed."),
        Err(e) => error_page(&e),
    }
}

pub async fn not_found() -> Response {
    not_found_page("The page you are looking for does not exist.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(10 * 1024 * 1024), "10.0 MB");
    }

    #[test]
    fn layout_escapes_title() {
        let html = layout("<x>", "<p>ok</p>");
        assert!(html.contains("<title>&lt;x&gt; · Atalho</title>"));
        assert!(html.contains("<p>ok</p>"));
    }

    #[test]
    fn home_keeps_submitted_values_escaped() {
        let view = HomeView {
            form: LinkForm {
                url: "https://example.com/?a=1&b=\"2\"".to_string(),
                slug: "docs".to_string(),
                ..LinkForm::default()
            },
            notice: Some(Notice::Failed("Slug already exists".to_string())),
            suggestions: vec![SlugSuggestion::new("docs-2", "<b>alt</b>")],
            links: Vec::new(),
        };
        let html = render_home(&view);
        assert!(html.contains("value=\"https://example.com/?a=1&amp;b=&quot;2&quot;\""));
        assert!(html.contains("<p class=\"error\">Slug already exists</p>"));
        assert!(html.contains("<code>docs-2</code> &lt;b&gt;alt&lt;/b&gt;"));
        assert!(html.contains("action=\"/\" method=\"post\""));
        assert!(html.contains("action=\"/files\" method=\"post\""));
    }
}
