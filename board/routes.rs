use std::io::Cursor;
use std::path::{Path, PathBuf};
use tiny_http::{Header, Method, Request, Response, StatusCode};
use tracing::{debug, warn};

use voxseg::logging::event_log::{list_runs, read_image_index, read_scalars};

use crate::form::{query_get, url_decode};
use crate::render;

type Reply = Response<Cursor<Vec<u8>>>;

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn respond_with(status: u16, content_type: &str, body: Vec<u8>) -> Reply {
    let len = body.len();
    let headers = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
        .into_iter()
        .collect();
    Response::new(StatusCode(status), headers, Cursor::new(body), Some(len), None)
}

fn html_response(body: String) -> Reply {
    respond_with(200, "text/html; charset=utf-8", body.into_bytes())
}

fn json_response(body: String) -> Reply {
    respond_with(200, "application/json", body.into_bytes())
}

fn not_found() -> Reply {
    respond_with(404, "text/plain", b"404 Not Found".to_vec())
}

fn server_error(msg: &str) -> Reply {
    respond_with(500, "text/plain", msg.as_bytes().to_vec())
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// Serves one request against the runs stored under `logdir`.
pub fn dispatch(request: Request, logdir: &Path) {
    let url = request.url().to_owned();
    let (path, query) = match url.find('?') {
        Some(pos) => (url[..pos].to_owned(), url[pos + 1..].to_owned()),
        None => (url.clone(), String::new()),
    };
    debug!(method = %request.method(), path = %path, "request");

    let response = if *request.method() != Method::Get {
        respond_with(405, "text/plain", b"405 Method Not Allowed".to_vec())
    } else {
        route(logdir, &path, &query)
    };
    if let Err(e) = request.respond(response) {
        warn!("failed to send response: {e}");
    }
}

fn route(logdir: &Path, path: &str, query: &str) -> Reply {
    if path == "/" {
        return handle_index(logdir);
    }
    let Some(rest) = path.strip_prefix("/runs/") else {
        return not_found();
    };
    let mut parts = rest.splitn(2, '/');
    let run = url_decode(parts.next().unwrap_or(""));
    let Some(run_dir) = run_dir(logdir, &run) else {
        return not_found();
    };
    match parts.next() {
        None | Some("") => handle_run(&run, &run_dir),
        Some("scalars") => handle_scalars(&run_dir, query),
        Some(file) if file.starts_with("images/") => handle_image(&run_dir, &url_decode(file)),
        Some(_) => not_found(),
    }
}

/// Resolves a run name to its directory, rejecting anything that is not a
/// single plain path component.
fn run_dir(logdir: &Path, run: &str) -> Option<PathBuf> {
    if !is_plain_component(run) {
        return None;
    }
    let dir = logdir.join(run);
    dir.is_dir().then_some(dir)
}

fn is_plain_component(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains('/') && !s.contains('\\')
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /`
fn handle_index(logdir: &Path) -> Reply {
    let names = match list_runs(logdir) {
        Ok(names) => names,
        Err(_) => Vec::new(),
    };
    let mut runs = Vec::with_capacity(names.len());
    for name in names {
        match read_scalars(logdir.join(&name)) {
            Ok(records) => runs.push((name, records)),
            Err(e) => warn!(run = %name, "skipping unreadable run: {e}"),
        }
    }
    html_response(render::index_page(&runs))
}

/// `GET /runs/<run>`
fn handle_run(run: &str, run_dir: &Path) -> Reply {
    let scalars = read_scalars(run_dir);
    let images = read_image_index(run_dir);
    match (scalars, images) {
        (Ok(scalars), Ok(images)) => html_response(render::run_page(run, &scalars, &images)),
        (Err(e), _) | (_, Err(e)) => server_error(&e.to_string()),
    }
}

/// `GET /runs/<run>/scalars?tag=<tag>`
///
/// Without `tag`, returns the list of available tags.
fn handle_scalars(run_dir: &Path, query: &str) -> Reply {
    let records = match read_scalars(run_dir) {
        Ok(records) => records,
        Err(e) => return server_error(&e.to_string()),
    };
    let body = match query_get(query, "tag") {
        Some(tag) => {
            let series: Vec<serde_json::Value> = records
                .iter()
                .filter(|r| r.tag == tag)
                .map(|r| serde_json::json!({ "step": r.step, "value": r.value, "wall_time": r.wall_time }))
                .collect();
            serde_json::json!({ "tag": tag, "points": series })
        }
        None => {
            let tags: Vec<&str> = render::group_by_tag(&records).into_keys().collect();
            serde_json::json!({ "tags": tags })
        }
    };
    json_response(body.to_string())
}

/// `GET /runs/<run>/images/<tag>/<file>.png`
fn handle_image(run_dir: &Path, rel: &str) -> Reply {
    if !rel.ends_with(".png") || !rel.split('/').all(is_plain_component) {
        return not_found();
    }
    match std::fs::read(run_dir.join(rel)) {
        Ok(bytes) => respond_with(200, "image/png", bytes),
        Err(_) => not_found(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;
    use voxseg::logging::event_log::EventLogWriter;
    use voxseg::logging::sink::MetricSink;

    fn body(reply: Reply) -> (u16, String) {
        let status = reply.status_code().0;
        let mut text = String::new();
        let _ = reply.into_reader().read_to_string(&mut text);
        (status, text)
    }

    #[test]
    fn serves_scalar_series_and_rejects_traversal() {
        let dir = tempdir().unwrap();
        let mut log = EventLogWriter::open(dir.path().join("run1")).unwrap();
        log.add_scalar("Loss/train", 0.5, 0).unwrap();
        log.add_scalar("Loss/train", 0.25, 1).unwrap();
        log.add_images("Original", &[image::RgbImage::new(2, 2)], 0).unwrap();
        log.flush().unwrap();

        let (status, text) = body(route(dir.path(), "/runs/run1/scalars", "tag=Loss%2Ftrain"));
        assert_eq!(status, 200);
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["points"].as_array().unwrap().len(), 2);
        assert_eq!(json["points"][1]["value"], 0.25);

        let (status, _) = body(route(dir.path(), "/runs/run1/images/Original/step_0_0.png", ""));
        assert_eq!(status, 200);
        let (status, _) = body(route(dir.path(), "/runs/run1/images/../scalars.jsonl", ""));
        assert_eq!(status, 404);
        let (status, _) = body(route(dir.path(), "/runs/..", ""));
        assert_eq!(status, 404);

        let (status, text) = body(route(dir.path(), "/", ""));
        assert_eq!(status, 200);
        assert!(text.contains("run1"));
    }
}
