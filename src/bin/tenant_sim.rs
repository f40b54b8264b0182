//! Tenant Simulator
//!
//! Simulates just enough of a Cumulocity tenant to exercise the agent
//! without a real platform: the bootstrap endpoint answers 404 until a
//! configurable number of polls have passed (standing in for the
//! operator approving the device in the console), the inventory
//! endpoint assigns managed object ids, and the telemetry endpoints
//! swallow whatever they are given.
//!
//! Usage: cargo run --bin tenant-sim [bind_addr]
//!
//! Options (env vars or defaults):
//!   APPROVE_AFTER=2   Bootstrap polls answered 404 before approval

use std::env;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const BOOTSTRAP_PATH: &str = "/devicecontrol/deviceCredentials";
const INVENTORY_PATH: &str = "/inventory/managedObjects/";

/// Credentials handed out once the device is "approved"
const TENANT_ID: &str = "t1";
const USERNAME: &str = "device_sim";
const PASSWORD: &str = "sim-secret";

struct TenantState {
    /// Bootstrap polls remaining until approval
    polls_until_approval: AtomicU32,
    /// Next managed object id
    next_id: AtomicU32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let bind_addr: SocketAddr = env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8443".to_string())
        .parse()?;
    let approve_after: u32 = env::var("APPROVE_AFTER")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(2);

    println!("🏭 c8y-uplink Tenant Simulator");
    println!("  Listening on: {}", bind_addr);
    println!("  Bootstrap approval after {} poll(s)", approve_after);
    println!();

    let state = Arc::new(TenantState {
        polls_until_approval: AtomicU32::new(approve_after),
        next_id: AtomicU32::new(4711),
    });

    let listener = TcpListener::bind(bind_addr).await?;
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, state).await {
                println!("⚠️  Connection from {} failed: {}", peer, e);
            }
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    state: Arc<TenantState>,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; 8192];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]).to_string();

    let path = request
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    println!("📨 {} {}", peer, request.lines().next().unwrap_or(""));

    let response = match path.as_str() {
        BOOTSTRAP_PATH => bootstrap_response(&state),
        INVENTORY_PATH => inventory_response(&state, &request),
        "/measurement/measurements" | "/alarm/alarms" | "/event/events" => {
            println!("   📊 Accepted telemetry: {}", body_of(&request));
            plain_response(201, "Created", "")
        }
        _ => plain_response(404, "Not Found", r#"{"error":"undefined/notFound"}"#),
    };

    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

fn bootstrap_response(state: &TenantState) -> String {
    let remaining = state
        .polls_until_approval
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .unwrap_or(0);

    if remaining > 0 {
        println!("   ⏳ Not approved yet ({} poll(s) to go)", remaining);
        plain_response(
            404,
            "Not Found",
            r#"{"error":"devicecontrol/Not Found","message":"Device credentials not found"}"#,
        )
    } else {
        println!("   ✅ Device approved, issuing credentials");
        plain_response(
            201,
            "Created",
            &format!(
                r#"{{"tenantId":"{}","username":"{}","password":"{}"}}"#,
                TENANT_ID, USERNAME, PASSWORD
            ),
        )
    }
}

fn inventory_response(state: &TenantState, request: &str) -> String {
    let id = state.next_id.fetch_add(1, Ordering::SeqCst);
    let name = field_of(body_of(request), "name").unwrap_or("unnamed");
    println!("   🆕 Managed object {} for device \"{}\"", id, name);
    plain_response(
        201,
        "Created",
        &format!(r#"{{"name":"{}","id":"{}","c8y_IsDevice":{{}}}}"#, name, id),
    )
}

fn plain_response(status: u16, reason: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        reason,
        body.len(),
        body
    )
}

fn body_of(request: &str) -> &str {
    request
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or("")
}

/// Minimal flat string-field lookup, enough for the sim's own logging
fn field_of<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    let marker = format!("\"{key}\":\"");
    let start = body.find(&marker)? + marker.len();
    let end = start + body[start..].find('"')?;
    Some(&body[start..end])
}
