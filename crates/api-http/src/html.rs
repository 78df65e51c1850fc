//! Minimal HTML browsing UI.
//!
//! `/html/` lists every stored blob; `/html/view/<name>` shows the live
//! content (or a historical version via `?history=<vid>`) next to the
//! version list. The pages are read-only conveniences over the same
//! datastore API the protocol adapter uses and are rendered from plain
//! strings.

use std::collections::HashMap;
use std::io::Read;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use chrono::SecondsFormat;
use tracing::debug;

use stsv_core::{FileEntry, StoreResult};

use crate::api::status_for;
use crate::server::AppState;

const STYLE: &str = "body{font-family:sans-serif;margin:2em}table{border-collapse:collapse}\
td,th{border:1px solid #ccc;padding:0.3em 0.8em;text-align:left}\
pre{background:#f4f4f4;padding:1em;overflow-x:auto}";

pub(crate) async fn index(State(state): State<AppState>) -> Response {
    let mut rows = String::new();
    let walked = state.datastore.walk(|entry| {
        rows.push_str(&list_row(&entry));
        true
    });
    if let Err(e) = walked {
        debug!(error = %e, "index walk failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(page("error", "<p>cannot list state files</p>")),
        )
            .into_response();
    }
    let body = format!(
        "<h1>state files</h1>\n<table>\n<tr><th>name</th><th>size</th>\
         <th>updated</th><th>lock</th></tr>\n{rows}</table>"
    );
    Html(page("index", &body)).into_response()
}

pub(crate) async fn view(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let target = query.get("history").map(String::as_str);
    debug!(%name, history = ?target, "view");

    let mut content = Vec::new();
    let fetched: StoreResult<()> = match target {
        Some(vid) => state.datastore.read_history(&name, vid).and_then(|mut file| {
            file.read_to_end(&mut content)?;
            Ok(())
        }),
        None => state.datastore.read(&name, &mut content),
    };
    if let Err(e) = fetched {
        return (
            status_for(&e),
            Html(page(&name, &format!("<p>{}: {e}</p>", escape(&name)))),
        )
            .into_response();
    }

    // State payloads are normally JSON; fall back to raw text when not.
    let rendered = match serde_json::from_slice::<serde_json::Value>(&content) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_default(),
        Err(_) => String::from_utf8_lossy(&content).into_owned(),
    };

    let mut versions = String::new();
    for entry in state.datastore.history(&name) {
        versions.push_str(&version_row(&name, &entry));
    }

    let body = format!(
        "<h1>{title}</h1>\n<pre>{content}</pre>\n<h2>versions</h2>\n\
         <table>\n<tr><th>version</th><th>size</th><th>updated</th></tr>\n{versions}</table>\n\
         <p><a href=\"/html/\">back to index</a></p>",
        title = escape(&name),
        content = escape(&rendered),
    );
    Html(page(&name, &body)).into_response()
}

fn list_row(entry: &FileEntry) -> String {
    format!(
        "<tr><td><a href=\"/html/view{href}\">{name}</a></td>\
         <td>{size}</td><td>{ts}</td><td>{lock}</td></tr>\n",
        href = escape(&entry.name),
        name = escape(&entry.name),
        size = entry.size,
        ts = entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        lock = if entry.locked { "locked" } else { "" },
    )
}

fn version_row(name: &str, entry: &FileEntry) -> String {
    let marker = if entry.locked { " (current)" } else { "" };
    format!(
        "<tr><td><a href=\"/html/view/{name}?history={vid}\">{vid}</a>{marker}</td>\
         <td>{size}</td><td>{ts}</td></tr>\n",
        name = escape(name),
        vid = escape(&entry.name),
        size = entry.size,
        ts = entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><title>{title}</title>\
         <style>{STYLE}</style></head>\n<body>\n{body}\n</body></html>\n",
        title = escape(title),
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn list_row_links_to_view() {
        let entry = FileEntry {
            name: "/project/state".into(),
            locked: true,
            timestamp: chrono::Utc::now(),
            size: 42,
        };
        let row = list_row(&entry);
        assert!(row.contains("href=\"/html/view/project/state\""));
        assert!(row.contains("locked"));
    }
}
