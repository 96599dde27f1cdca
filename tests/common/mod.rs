//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use upload_guard::{GuardConfig, HttpServer, Shutdown};

pub const INTRO_VIDEO: &[u8] = b"intro video bytes";

/// A throwaway upload root with one file per resource directory plus files
/// that must never be served.
pub struct UploadRoot {
    pub path: PathBuf,
}

impl UploadRoot {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("upload-guard-it-{}", uuid::Uuid::new_v4()));
        for dir in ["videos", "pdfs", "lectures", "gallery", "private"] {
            std::fs::create_dir_all(path.join(dir)).unwrap();
        }
        std::fs::write(path.join("videos/intro.mp4"), INTRO_VIDEO).unwrap();
        std::fs::write(path.join("pdfs/syllabus.pdf"), b"%PDF-1.4").unwrap();
        std::fs::write(path.join("lectures/week1.pdf"), b"%PDF-1.4").unwrap();
        std::fs::write(path.join("gallery/campus.png"), b"png").unwrap();
        std::fs::write(path.join("private/secret.txt"), b"secret").unwrap();
        std::fs::write(path.join("notes.txt"), b"notes").unwrap();
        Self { path }
    }
}

impl Drop for UploadRoot {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.path).unwrap_or_default();
    }
}

pub fn test_config(root: &Path) -> GuardConfig {
    let mut config = GuardConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.uploads.root_dir = root.to_path_buf();
    config
}

/// Start a server on an ephemeral port.
#[allow(dead_code)]
pub async fn spawn_server(config: GuardConfig) -> (SocketAddr, Shutdown, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        server.run(listener, server_shutdown).await.unwrap();
    });

    (addr, shutdown, handle)
}
