use anyhow::Context;
use axum::extract::{Form, Query, State};
use axum::response::{Html, Redirect};
use axum::routing::{get, post};
use axum::Router;
use ripweb_protocol::{DisplayItem, DownloadForm, IndexQuery, MediaType, SearchForm};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod orchestrator;
mod page;

use crate::orchestrator::{OperationError, OperationOutcome, Orchestrator, SearchRequest};
use crate::page::Page;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "ripweb",
    about = "Small web front-end for searching and downloading music with rip"
)]
struct Opt {
    /// Configuration file (RON). Defaults are used when omitted.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Address to listen on, overrides the configuration file. Ignored when started with an
    /// inherited socket.
    #[structopt(long)]
    listen: Option<SocketAddr>,
}

struct AppState {
    orchestrator: Orchestrator,
}

async fn index(Query(query): Query<IndexQuery>) -> Html<String> {
    let search_type = MediaType::or_track(query.search_type.as_deref());
    Html(page::render(&Page {
        search_type,
        download_output: query.download_output.as_deref(),
        ..Page::default()
    }))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IndexQuery>,
    Form(form): Form<SearchForm>,
) -> Html<String> {
    // form wins over the query string
    let search_type = MediaType::or_track(
        form.search_type
            .as_deref()
            .or_else(|| query.search_type.as_deref()),
    );
    let text_input = match form.text_input {
        Some(text_input) => text_input,
        None => {
            return Html(page::render(&Page {
                search_type,
                download_output: query.download_output.as_deref(),
                ..Page::default()
            }))
        }
    };

    let outcome = state
        .orchestrator
        .search(&SearchRequest {
            query: text_input.clone(),
            media_type: search_type,
        })
        .await;
    let search_output = outcome.status_message();
    let items: &[DisplayItem] = match &outcome {
        OperationOutcome::Found { items } => items.as_slice(),
        _ => &[],
    };
    Html(page::render(&Page {
        items,
        search_type,
        query: Some(&text_input),
        search_output: search_output.as_deref(),
        download_output: query.download_output.as_deref(),
    }))
}

async fn download_item(
    State(state): State<Arc<AppState>>,
    Form(form): Form<DownloadForm>,
) -> Redirect {
    let outcome = state.orchestrator.download_form(&form).await;
    let message = outcome.status_message().unwrap_or_default();
    let mut location = format!("/?download_output={}", urlencoding::encode(&message));
    // keep the type toggle where the user left it, unless nothing got as far as running rip
    if !matches!(
        outcome,
        OperationOutcome::Failure(OperationError::Validation)
            | OperationOutcome::Failure(OperationError::LogDeletion(_))
    ) {
        if let Some(media_type) = form
            .item_type
            .as_deref()
            .and_then(|t| t.parse::<MediaType>().ok())
        {
            location.push_str("&search_type=");
            location.push_str(media_type.as_str());
        }
    }
    Redirect::to(&location)
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index).post(search))
        .route("/download_item", post(download_item))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let opt = Opt::from_args();
    let config = match &opt.config {
        Some(path) => config::Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => config::Config::default(),
    };

    std::fs::create_dir_all(&config.storage_dir)
        .with_context(|| format!("creating {}", config.storage_dir.display()))?;
    let storage_dir = std::fs::canonicalize(&config.storage_dir)
        .with_context(|| format!("resolving {}", config.storage_dir.display()))?;

    let rip = config.rip().context("bad rip settings in config")?;
    match rip.version().await {
        Ok(version) => info!(program = ?rip.program(), %version, "found rip"),
        Err(error) => warn!(
            program = ?rip.program(),
            %error,
            "rip does not seem to be runnable, searches and downloads will fail"
        ),
    }

    let state = Arc::new(AppState {
        orchestrator: Orchestrator::new(rip, config.artifact_paths(&storage_dir)),
    });
    let app = router(state).layer(TraceLayer::new_for_http());

    let mut listenfd = listenfd::ListenFd::from_env();
    let listener = match listenfd
        .take_tcp_listener(0)
        .context("inherited socket is not a TCP listener")?
    {
        Some(std_listener) => {
            std_listener.set_nonblocking(true)?;
            tokio::net::TcpListener::from_std(std_listener)?
        }
        None => {
            let addr = opt.listen.unwrap_or(config.listen);
            tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("listening on {}", addr))?
        }
    };
    info!(addr = %listener.local_addr()?, storage_dir = ?storage_dir, "serving");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::orchestrator::ArtifactPaths;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use rip_remote::Rip;
    use tempfile::TempDir;
    use tower::ServiceExt; // for `oneshot`

    // search writes two results, download prints a line per stream
    const FAKE_RIP: &str = r#"case "$1" in
search)
    cat > "$3" <<'JSON'
[{"id": 11, "desc": "Go Your Own Way by Fleetwood Mac", "media_type": "track"},
 {"id": "x<y", "desc": "Rumours", "media_type": "album"}]
JSON
    ;;
id)
    echo "downloading $3 $5"
    echo "done" >&2
    ;;
esac
"#;

    fn app() -> (TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-rip.sh");
        std::fs::write(&script, FAKE_RIP).unwrap();
        let rip = Rip::builder()
            .program("/bin/sh")
            .leading_args(vec![script.to_string_lossy().into_owned()])
            .build()
            .unwrap();
        let paths = ArtifactPaths {
            track_results: dir.path().join("search_track.json"),
            album_results: dir.path().join("search_album.json"),
            download_log: dir.path().join("download_log.txt"),
        };
        let state = Arc::new(AppState {
            orchestrator: Orchestrator::new(rip, paths),
        });
        (dir, router(state))
    }

    fn post_form(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn index_defaults_to_tracks() {
        let (_dir, app) = app();
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains(r#"value="track" checked"#));
    }

    #[tokio::test]
    async fn index_shows_redirected_download_output() {
        let (_dir, app) = app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/?download_output=Error%3A%20%3Cbad%3E&search_type=album")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let html = body_text(response).await;
        assert!(html.contains(r#"value="album" checked"#));
        assert!(html.contains("Error: &lt;bad&gt;"));
    }

    #[tokio::test]
    async fn search_lists_items() {
        let (_dir, app) = app();
        let response = app
            .oneshot(post_form("/", "search_type=track&text_input=fleetwood+mac"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("<td>Go Your Own Way</td><td>Fleetwood Mac</td><td>track</td>"));
        assert!(html.contains("<td>Rumours</td><td>Unknown Artist</td><td>album</td>"));
        assert!(html.contains(r#"name="item_id" value="x&lt;y""#));
        assert!(html.contains(r#"value="fleetwood mac""#));
        assert!(!html.contains("search-output"));
    }

    #[tokio::test]
    async fn post_without_text_input_does_not_search() {
        let (dir, app) = app();
        let response = app
            .oneshot(post_form("/", "search_type=album"))
            .await
            .unwrap();
        let html = body_text(response).await;
        assert!(html.contains(r#"value="album" checked"#));
        assert!(!html.contains("<table>"));
        assert!(!dir.path().join("search_album.json").exists());
    }

    #[tokio::test]
    async fn download_redirects_with_log() {
        let (_dir, app) = app();
        let response = app
            .oneshot(post_form("/download_item", "item_id=11&item_type=album"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        let expected = format!(
            "/?download_output={}&search_type=album",
            urlencoding::encode(
                "Download initiated for album ID: 11\nLog:\ndownloading album 11\ndone\n"
            )
        );
        assert_eq!(location, expected);
    }

    #[tokio::test]
    async fn download_log_stuck_drops_search_type() {
        let (dir, app) = app();
        // a non-empty directory where the log goes can't be removed
        let log = dir.path().join("download_log.txt");
        std::fs::create_dir(&log).unwrap();
        std::fs::write(log.join("keep"), "").unwrap();

        let response = app
            .oneshot(post_form("/download_item", "item_id=11&item_type=album"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        let prefix = format!(
            "/?download_output={}",
            urlencoding::encode("Error: Could not delete old download log. Details: ")
        );
        assert!(location.starts_with(&prefix), "{}", location);
        assert!(!location.contains("search_type="), "{}", location);
    }

    #[tokio::test]
    async fn download_rejects_invalid_type() {
        let (dir, app) = app();
        let response = app
            .oneshot(post_form("/download_item", "item_id=11&item_type=playlist"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert_eq!(
            location,
            format!(
                "/?download_output={}",
                urlencoding::encode("Error: Invalid item ID or type provided for download.")
            )
        );
        assert!(!dir.path().join("download_log.txt").exists());
    }
}
