// src/io/http_service.rs - serves the descriptor and frames of one store
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, anyhow};
use log::{debug, info, warn};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use crate::core::FrameError;
use crate::monitoring::Metrics;
use crate::publish::{DESCRIPTOR_FILE, Publisher};
use crate::store::{FrameNaming, FrameStore};

type Body = Response<Cursor<Vec<u8>>>;

pub struct FrameHttpService {
    bind: String,
    store: Arc<dyn FrameStore>,
    publisher: Arc<Publisher>,
    naming: FrameNaming,
    metrics: Arc<Metrics>,
}

/// Running responder. Dropping it without `stop` leaves the thread serving.
pub struct HttpHandle {
    server: Arc<Server>,
    thread: Option<JoinHandle<()>>,
    addr: SocketAddr,
}

impl HttpHandle {
    /// Bound address; useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stop(mut self) {
        self.server.unblock();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("[http] responder thread panicked");
            }
        }
        info!("[http] stopped");
    }
}

impl FrameHttpService {
    pub fn new(
        bind: impl Into<String>,
        store: Arc<dyn FrameStore>,
        publisher: Arc<Publisher>,
        naming: FrameNaming,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            bind: bind.into(),
            store,
            publisher,
            naming,
            metrics,
        }
    }

    pub fn start(self) -> anyhow::Result<HttpHandle> {
        let server = Server::http(&self.bind).map_err(|e| anyhow!(e))?;
        let addr = server
            .server_addr()
            .to_ip()
            .with_context(|| format!("{} is not an IP listener", self.bind))?;
        let server = Arc::new(server);

        info!("[http] serving on {}", addr);

        let worker = server.clone();
        let thread = thread::Builder::new()
            .name("http".to_string())
            .spawn(move || {
                for req in worker.incoming_requests() {
                    self.handle(req);
                }
            })
            .context("spawn http thread")?;

        Ok(HttpHandle {
            server,
            thread: Some(thread),
            addr,
        })
    }

    fn handle(&self, req: Request) {
        let url = req.url().to_string();
        let path = url.split_once('?').map_or(url.as_str(), |(p, _)| p);

        let response = if req.method() != &Method::Get {
            text(405, "method not allowed")
        } else {
            self.route(path)
        };

        if let Err(e) = req.respond(response) {
            debug!("[http] client went away during {}: {}", path, e);
        }
    }

    fn route(&self, path: &str) -> Body {
        let Some(name) = path.strip_prefix('/') else {
            return self.not_found(path);
        };

        match name {
            DESCRIPTOR_FILE => {
                self.metrics.descriptor_requested();
                text(200, &self.publisher.published().encode())
            }
            "health" => text(200, "ok"),
            "status" => {
                let status = self.metrics.status(self.publisher.published());
                match serde_json::to_vec(&status) {
                    Ok(body) => with_type(Response::from_data(body), "application/json"),
                    Err(e) => text(500, &e.to_string()),
                }
            }
            _ => match self.naming.parse_id(name) {
                Some(id) => self.frame(id),
                None => self.not_found(path),
            },
        }
    }

    fn frame(&self, id: u64) -> Body {
        match self.store.get(id) {
            Ok(frame) => {
                self.metrics.frame_served();
                debug!("[http] frame {} ({} bytes)", id, frame.payload.len());
                with_type(Response::from_data(frame.payload), "image/jpeg")
            }
            Err(FrameError::NotFound { .. }) => {
                self.metrics.not_found();
                text(404, "frame not found")
            }
            Err(e) => {
                warn!("[http] frame {}: {}", id, e);
                text(500, "frame unreadable")
            }
        }
    }

    fn not_found(&self, path: &str) -> Body {
        self.metrics.not_found();
        debug!("[http] no route for {}", path);
        text(404, "not found")
    }
}

fn text(status: u16, body: &str) -> Body {
    Response::from_string(body).with_status_code(StatusCode(status))
}

fn with_type(response: Body, content_type: &str) -> Body {
    match Header::from_bytes("Content-Type", content_type) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}
