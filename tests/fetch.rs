//! Index Fetch Tests
//!
//! Manifest and layout downloads against a small in-process HTTP server.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use flate2::write::GzEncoder;
use flate2::Compression;
use shuttle_renders::{IndexClient, PipelineError, RenderConfig, Shuttle};
use tempfile::TempDir;

/// Serves fixed bodies by path, 404 otherwise, and records every path asked for.
struct IndexServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl IndexServer {
    fn start(routes: impl FnOnce(&str) -> HashMap<String, Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let routes = routes(&base_url);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                serve(stream, &routes, &seen);
            }
        });

        Self { base_url, requests }
    }

    fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn serve(mut stream: TcpStream, routes: &HashMap<String, Vec<u8>>, seen: &Mutex<Vec<String>>) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    let text = String::from_utf8_lossy(&request);
    let path = text.split_whitespace().nth(1).unwrap_or("/").to_string();
    seen.lock().unwrap().push(path.clone());

    let (status, body) = match routes.get(&path) {
        Some(body) => ("200 OK", body.as_slice()),
        None => ("404 Not Found", &b"not found"[..]),
    };
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn tt04_routes(base: &str) -> HashMap<String, Vec<u8>> {
    let manifest = serde_json::json!({
        "projects": [{"macro": "a"}, {"macro": "b"}, {"macro": "c"}]
    });
    let index = serde_json::json!({
        "shuttles": [
            {"id": "tt03", "project_gds_url_template": format!("{}/tt03/{{macro}}.gds", base)},
            {"id": "tt04", "project_gds_url_template": format!("{}/tt04/{{macro}}.gds.gz", base)},
        ]
    });

    let mut routes = HashMap::new();
    routes.insert("/tt04.json".to_string(), manifest.to_string().into_bytes());
    routes.insert("/index.json".to_string(), index.to_string().into_bytes());
    routes.insert("/tt04/a.gds.gz".to_string(), gzip(b"GDS a"));
    routes.insert("/tt04/b.gds.gz".to_string(), gzip(b"GDS b"));
    // c has no layout on the server
    routes
}

fn config_in(dir: &TempDir) -> RenderConfig {
    RenderConfig {
        manifest_dir: dir.path().join("manifests"),
        layout_dir: dir.path().join("gds"),
        output_dir: dir.path().join("shuttles"),
        ..RenderConfig::default()
    }
}

#[test]
fn fetch_fills_manifest_and_layout_dirs() {
    let server = IndexServer::start(tt04_routes);
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let client = IndexClient::new(&server.base_url).unwrap();

    let manifest = client.fetch_manifest(&config, "tt04").unwrap();
    assert_eq!(manifest, config.manifest_path("tt04"));

    let shuttle = Shuttle::load(&config, "tt04").unwrap();
    assert_eq!(shuttle.len(), 3);

    let summary = client.fetch_layouts(&shuttle).unwrap();
    assert_eq!(summary.downloaded, ["a", "b"]);
    assert!(summary.cached.is_empty());
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "c");

    // .gz downloads are stored decompressed under the plain layout name
    assert_eq!(fs::read(config.layout_dir.join("tt04/a.gds")).unwrap(), b"GDS a");
    assert_eq!(fs::read(config.layout_dir.join("tt04/b.gds")).unwrap(), b"GDS b");
    assert!(!config.layout_dir.join("tt04/c.gds").exists());
    assert!(!config.layout_dir.join("tt04/.partial-c.gds").exists());
}

#[test]
fn existing_layouts_are_not_downloaded_again() {
    let server = IndexServer::start(tt04_routes);
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let client = IndexClient::new(&server.base_url).unwrap();

    client.fetch_manifest(&config, "tt04").unwrap();
    fs::create_dir_all(config.layout_dir.join("tt04")).unwrap();
    fs::write(config.layout_dir.join("tt04/a.gds"), b"local a").unwrap();

    let shuttle = Shuttle::load(&config, "tt04").unwrap();
    let summary = client.fetch_layouts(&shuttle).unwrap();

    assert_eq!(summary.cached, ["a"]);
    assert_eq!(summary.downloaded, ["b"]);
    assert_eq!(fs::read(config.layout_dir.join("tt04/a.gds")).unwrap(), b"local a");
    assert!(!server.requested().iter().any(|p| p == "/tt04/a.gds.gz"));
}

#[test]
fn fully_cached_shuttle_skips_the_index() {
    let server = IndexServer::start(tt04_routes);
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let client = IndexClient::new(&server.base_url).unwrap();

    client.fetch_manifest(&config, "tt04").unwrap();
    fs::create_dir_all(config.layout_dir.join("tt04")).unwrap();
    for p in ["a", "b", "c"] {
        fs::write(config.layout_dir.join(format!("tt04/{}.gds", p)), b"GDS").unwrap();
    }

    let shuttle = Shuttle::load(&config, "tt04").unwrap();
    let summary = client.fetch_layouts(&shuttle).unwrap();

    assert_eq!(summary.cached.len(), 3);
    assert_eq!(server.requested(), ["/tt04.json"]);
}

#[test]
fn unknown_shuttle_manifest_is_not_found() {
    let server = IndexServer::start(tt04_routes);
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let client = IndexClient::new(&server.base_url).unwrap();

    let err = client.fetch_manifest(&config, "tt99").unwrap_err();
    assert!(matches!(err, PipelineError::ManifestNotFound(ref id) if id == "tt99"));
    assert!(!config.manifest_path("tt99").exists());
}

#[test]
fn shuttle_missing_from_index_is_an_error() {
    let server = IndexServer::start(|base| {
        let mut routes = tt04_routes(base);
        routes.insert(
            "/tt05.json".to_string(),
            serde_json::json!({"projects": [{"macro": "x"}]}).to_string().into_bytes(),
        );
        routes
    });
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let client = IndexClient::new(&server.base_url).unwrap();

    client.fetch_manifest(&config, "tt05").unwrap();
    let shuttle = Shuttle::load(&config, "tt05").unwrap();
    let err = client.fetch_layouts(&shuttle).unwrap_err();
    assert!(matches!(err, PipelineError::ManifestNotFound(_)));
}

#[cfg(unix)]
#[test]
fn cli_fetch_then_render() {
    use shuttle_renders::cli::{self, CommonArgs};
    use shuttle_renders::{ArtifactKind, ToolSpec};

    let server = IndexServer::start(tt04_routes);
    let dir = tempfile::tempdir().unwrap();
    let rendered = RenderConfig {
        index_url: server.base_url.clone(),
        oasis_tool: ToolSpec::new("sh", &["-c", r#"printf '%%SEMI-OASIS\r\n' > "$0""#, "{output}"]),
        ..config_in(&dir)
    };
    let config_path = dir.path().join("render.json");
    fs::write(&config_path, serde_json::to_string(&rendered).unwrap()).unwrap();

    let args = CommonArgs {
        shuttle: "tt04".to_string(),
        config: Some(config_path),
        manifest_dir: None,
        layout_dir: None,
        output_dir: None,
        fetch: true,
        verbose: false,
    };
    let report = cli::run(&args, ArtifactKind::Oasis, None).unwrap();

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.exit_code(), 2);
    let failed: Vec<_> = report.failed_projects().map(|o| o.project.as_str()).collect();
    assert_eq!(failed, ["c"]);
    assert!(rendered.output_dir.join("tt04/a/a.oas").is_file());
}
