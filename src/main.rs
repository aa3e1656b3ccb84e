use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

use ripspdy::utils::parse_headers;
use ripspdy::{
    logging, Client, ClientConfig, ClientTimeouts, ProtocolError, Request, Response,
    ResponseHandler,
};

#[derive(Debug, Parser)]
#[command(name = "ripspdy", version, about = "Send requests over SPDY/2")]
struct Cli {
    /// Target URL
    #[arg(short = 'u', long = "url", value_name = "URL")]
    url_flag: Option<String>,

    /// Target URL
    #[arg(value_name = "URL", conflicts_with = "url_flag")]
    url: Option<String>,

    /// Send this body as a POST
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Number of times to send the request
    #[arg(short = 't', long = "times", default_value_t = 1)]
    times: u32,

    /// Extra request header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Verify server certificates against the webpki roots
    #[arg(long)]
    verify: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn build_request(cli: &Cli, url: &str) -> Result<Request, ProtocolError> {
    let method = if cli.data.is_some() { "POST" } else { "GET" };
    let mut request = Request::new(url, method)?;
    request.set_header("cache-control", "nostore");
    request.set_header("accept-encoding", "gzip, deflate");
    for header in parse_headers(&cli.headers)? {
        let value = header.value.clone().unwrap_or_default();
        request.set_header(&header.name, value);
    }
    if let Some(data) = &cli.data {
        request.set_body(data.clone().into_bytes());
    }
    Ok(request)
}

fn print_response(stream_id: u32, response: &Response) {
    println!("StreamId#{}: {}", stream_id, response.status_line());
    for header in &response.headers {
        println!("{:<32}{}", format!("{}:", header.name), header.value_str());
    }
    println!();
    println!("{}", response.text());
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let Some(url) = cli.url_flag.clone().or_else(|| cli.url.clone()) else {
        eprintln!("a URL is required (-u URL)");
        return ExitCode::FAILURE;
    };

    let request = match build_request(&cli, &url) {
        Ok(request) => request,
        Err(err) => {
            error!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let timeouts = ClientTimeouts {
        read: Some(Duration::from_secs(cli.timeout)),
        ..ClientTimeouts::default()
    };
    let config = ClientConfig::default()
        .timeouts(timeouts)
        .verify_certificates(cli.verify);
    let client = Client::with_config(config);

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let mut sent = 0;
    for _ in 0..cli.times {
        let done = done_tx.clone();
        let handler: ResponseHandler = Box::new(move |stream_id, result| {
            let _ = done.send((stream_id, result));
        });
        match client.request(request.clone(), handler).await {
            Ok(stream_id) => {
                debug!(stream_id, "request sent");
                sent += 1;
            }
            Err(err) => error!("{}", err),
        }
    }
    drop(done_tx);

    let mut failed = sent < cli.times;
    let deadline = Duration::from_secs(cli.timeout);
    for _ in 0..sent {
        match tokio::time::timeout(deadline, done_rx.recv()).await {
            Ok(Some((stream_id, Ok(response)))) => print_response(stream_id, &response),
            Ok(Some((stream_id, Err(err)))) => {
                eprintln!("StreamId#{}: {}", stream_id, err);
                failed = true;
            }
            Ok(None) => break,
            Err(_) => {
                eprintln!("timed out waiting for responses");
                failed = true;
                break;
            }
        }
    }

    client.close().await;
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
