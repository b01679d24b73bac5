use actix_web::{App, HttpResponse, HttpServer, Responder, get};
use serde::Serialize;
use std::net::Ipv4Addr;

use crate::metrics::{METRICS, MetricsSnapshot};

#[derive(Serialize)]
struct ProbeResp<'a> {
    status: &'a str,
}

#[get("/k8s/readyz")]
async fn readyz() -> impl Responder {
    if METRICS.is_ready() {
        HttpResponse::Ok().json(ProbeResp { status: "ok" })
    } else {
        HttpResponse::ServiceUnavailable().json(ProbeResp { status: "starting" })
    }
}

#[get("/k8s/livez")]
async fn livez() -> impl Responder {
    HttpResponse::Ok().json(ProbeResp { status: "ok" })
}

fn exposition(m: &MetricsSnapshot) -> String {
    let gauges: [(&str, &str, &str, String); 8] = [
        ("uptime_seconds", "counter", "Seconds since process start", m.uptime_secs.to_string()),
        ("ready", "gauge", "1 if ready, 0 otherwise", u8::from(m.ready).to_string()),
        ("active_voice_calls", "gauge", "Number of active voice calls", m.active_voice_calls.to_string()),
        ("total_queue_len", "gauge", "Tracks queued across calls (approx)", m.total_queue_len.to_string()),
        ("playlist_writes_total", "counter", "Committed playlist mutations", m.playlist_writes.to_string()),
        ("hydrate_failures_total", "counter", "Playlist tracks that failed to resolve", m.hydrate_failures.to_string()),
        ("downloads_bytes", "gauge", "Total size of the download cache in bytes", m.downloads_bytes.to_string()),
        ("downloads_files", "gauge", "Total files in the download cache", m.downloads_files.to_string()),
    ];
    let mut body = String::new();
    for (name, kind, help, value) in gauges {
        body.push_str(&format!(
            "# HELP melodeck_{name} {help}\n# TYPE melodeck_{name} {kind}\nmelodeck_{name} {value}\n"
        ));
    }
    body
}

#[get("/k8s/metrics")]
async fn metrics() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(exposition(&METRICS.snapshot()))
}

pub async fn run_http(bind: Option<String>) -> std::io::Result<()> {
    let bind_addr = bind.unwrap_or_else(|| format!("{}:{}", Ipv4Addr::UNSPECIFIED, 3000));
    let server = HttpServer::new(|| App::new().service(readyz).service(livez).service(metrics))
        .bind(bind_addr)?
        .workers(1) // lightweight
        .run();
    server.await
}
