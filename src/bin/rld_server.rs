//! Ephemeral live-view reader (§4.6): one invocation answers one web
//! request against the shared live-view segment, then exits.
//!
//! `rld-server <request-id> <get-data:0|1> <time-scale:0|1|2> <last-seen-ms>`

use std::process;

use log::error;

use rocketlogger::error::{Error, Result};
use rocketlogger::ipc::live_view::LiveViewReader;

/// Margin (ms) added before converting a client's staleness into a row
/// count, absorbing jitter between the producer's publish tick and the
/// client's last-seen timestamp (§4.6).
const TIME_MARGIN_MS: i64 = 10;

struct Request {
    id: String,
    get_data: bool,
    time_scale: usize,
    last_seen_ms: i64,
}

fn parse_args(args: &[String]) -> Result<Request> {
    if args.len() != 4 {
        return Err(Error::configuration(
            "usage: rld-server <request-id> <get-data:0|1> <time-scale:0|1|2> <last-seen-ms>",
        ));
    }
    let get_data = match args[1].as_str() {
        "0" => false,
        "1" => true,
        _ => return Err(Error::configuration("get-data must be 0 or 1")),
    };
    let time_scale: usize = args[2]
        .parse()
        .map_err(|_| Error::configuration("invalid time-scale"))?;
    if time_scale > 2 {
        return Err(Error::configuration("time-scale must be 0, 1, or 2"));
    }
    let last_seen_ms: i64 = args[3]
        .parse()
        .map_err(|_| Error::configuration("invalid last-seen-ms"))?;
    Ok(Request { id: args[0].clone(), get_data, time_scale, last_seen_ms })
}

/// Answers one request: waits for fresh data if the client is already
/// caught up, then returns exactly the rows published since
/// `last_seen_ms` (clamped to what the ring buffer holds) for the
/// requested time scale (§4.6).
fn serve(request: &Request) -> Result<serde_json::Value> {
    let reader = LiveViewReader::attach()?;
    let (mut timestamp_ms, channel_count) = reader.peek()?;

    if request.last_seen_ms >= timestamp_ms {
        let _ = reader.wait_for_update();
        let fresh = reader.peek()?;
        timestamp_ms = fresh.0;
    }

    let rows = if request.get_data {
        let row_count = (timestamp_ms - request.last_seen_ms + TIME_MARGIN_MS) / 1000;
        let row_count = row_count.max(0) as u32;
        reader.snapshot(request.time_scale, row_count)?
    } else {
        Vec::new()
    };

    Ok(serde_json::json!({
        "request_id": request.id,
        "timestamp_ms": timestamp_ms,
        "channel_count": channel_count,
        "rows": rows,
    }))
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let request = parse_args(&args)?;
    let response = serve(&request)?;
    println!("{}", response);
    Ok(())
}

fn main() {
    let _ = rocketlogger::logging::init();

    if let Err(e) = run() {
        error!("{}", e);
        eprintln!("rld-server: {}", e);
        process::exit(1);
    }
}
