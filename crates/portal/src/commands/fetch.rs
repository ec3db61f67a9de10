//! Fetch command - sends one API request through the session pipeline.

use anyhow::{Result, anyhow, bail};
use clap::Args;
use portal_auth::{ApiRequest, Method};

use super::Context;

/// Arguments for the fetch command.
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// API path, relative to the server URL (e.g. /api/events)
    pub path: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Request header, as 'Name: value' (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Request body; sent as JSON when it parses as JSON
    #[arg(short = 'd', long)]
    pub data: Option<String>,
}

/// Run the fetch command.
pub async fn run(args: FetchArgs, ctx: &Context) -> Result<()> {
    let request = build_request(&args)?;

    let session = ctx.session(false)?;
    if !session.check_auth().await.is_authenticated() {
        bail!(
            "Not signed in: {}",
            session.error().unwrap_or_else(|| "no session".to_string())
        );
    }

    let response = session.fetch_with_auth(request).await?;

    if ctx.verbose {
        eprintln!("{}", response.status);
    }
    let body = response.text();
    if ctx.json_output
        && let Ok(value) = response.json::<serde_json::Value>()
    {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if !body.is_empty() {
        println!("{}", body);
    }

    if !response.is_success() {
        bail!("Request failed with {}", response.status);
    }
    Ok(())
}

fn build_request(args: &FetchArgs) -> Result<ApiRequest> {
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .map_err(|_| anyhow!("Invalid HTTP method '{}'", args.method))?;
    let mut request = ApiRequest::new(method, args.path.clone());

    for header in &args.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| anyhow!("Header '{}' is not in 'Name: value' form", header))?;
        request = request.header(name.trim(), value.trim())?;
    }

    if let Some(data) = &args.data {
        request = match serde_json::from_str::<serde_json::Value>(data) {
            Ok(value) => request.json(&value)?,
            Err(_) => request.body(data.clone()),
        };
    }

    Ok(request)
}
