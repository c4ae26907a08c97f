//! Gia Phả CLI - a terminal front end for a family-tree chart.
//!
//! Every command goes through `ChartSync`, so reads are cached and writes
//! invalidate what they affect exactly as a graphical client would see.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use giapha_core::api::ApiError;
use giapha_core::error::SESSION_EXPIRED;
use giapha_core::mutations::{
    AddEditor, CreateChart, DeleteChart, Mutation, RemoveEditor, UpdateChart,
};
use giapha_core::{Chart, ChartSync, Config, QueryResult, Session, SessionData, SyncError};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Messages
// ============================================================================

const LOADING: &str = "Đang tải...";
const NO_CHART: &str = "Bạn chưa có Gia Phả nào";
const NO_SHARED_CHARTS: &str = "Chưa có gia phả nào được chia sẻ với bạn.";
const NO_PUBLISHED_CHARTS: &str = "Chưa có gia phả công khai nào.";
const NO_EDITORS: &str = "Chưa có người chỉnh sửa nào khác.";
const CREATED: &str = "Đã tạo gia phả mới.";
const UPDATED: &str = "Đã cập nhật thông tin.";
const DELETED: &str = "Đã xóa gia phả.";
const EDITOR_REMOVED: &str = "Đã xóa quyền chỉnh sửa.";
const SIGNED_IN: &str = "Đã đăng nhập.";
const SIGNED_OUT: &str = "Đã đăng xuất.";
const SERVER_SAVED: &str = "Đã lưu địa chỉ máy chủ.";

const USAGE: &str = "\
Usage: giapha <command>

Commands:
  login <token>                            Save an access token
  logout                                   Forget the token and cached data
  my                                       Show your chart
  shared                                   Charts you can edit
  published                                Public charts
  editors                                  Editors of your chart
  create <name> [description]              Create your chart
  update <name> <description> <public|private>
  delete                                   Delete your chart
  add-editor <email>                       Grant edit rights
  remove-editor <userId>                   Revoke edit rights
  server <url>                             Set and save the service URL";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // RUST_LOG controls the level (e.g. RUST_LOG=giapha_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(ExitCode::SUCCESS);
    };

    let mut config = Config::load()?;
    if let ("server", [url]) = (command.as_str(), &args[1..]) {
        config.api_base_url = url.clone();
        // Fail before saving an address the client cannot use.
        giapha_core::HttpChartApi::from_config(&config).context("Invalid service URL")?;
        config.save()?;
        println!("{}", SERVER_SAVED);
        return Ok(ExitCode::SUCCESS);
    }

    let session = Session::new(config.cache_dir()?);
    if session.load()? {
        info!("restored saved session");
    }
    let sync = ChartSync::from_config(&config, session.clone())
        .context("Failed to build the chart client")?;

    let ok = match (command.as_str(), &args[1..]) {
        ("login", [token]) => {
            sync.sign_in(SessionData::new(token.as_str()));
            session.save()?;
            println!("{}", SIGNED_IN);
            true
        }
        ("logout", []) => {
            sync.sign_out();
            session.clear()?;
            println!("{}", SIGNED_OUT);
            true
        }
        ("my", []) => show_my_chart(&sync).await,
        ("shared", []) => show_edited_charts(&sync).await,
        ("published", []) => show_published_charts(&sync).await,
        ("editors", []) => show_editors(&sync).await,
        ("create", [name, rest @ ..]) if rest.len() <= 1 => {
            let description = rest.first().map(String::as_str).unwrap_or("");
            let result = sync.create_chart(name, description).await;
            report::<CreateChart, _>(result, |_| CREATED.to_string())
        }
        ("update", [name, description, visibility]) => {
            let published = parse_visibility(visibility)?;
            match require_my_chart(&sync).await {
                Some(chart) => {
                    let result = sync.update_chart(&chart.id, name, description, published).await;
                    report::<UpdateChart, _>(result, |_| UPDATED.to_string())
                }
                None => false,
            }
        }
        ("delete", []) => match require_my_chart(&sync).await {
            Some(chart) => {
                let result = sync.delete_chart(&chart.id).await;
                report::<DeleteChart, _>(result, |_| DELETED.to_string())
            }
            None => false,
        },
        ("add-editor", [email]) => match require_my_chart(&sync).await {
            Some(chart) => {
                let result = sync.add_editor(&chart.id, email).await;
                report::<AddEditor, _>(result, |_| {
                    format!("Đã thêm {} làm người chỉnh sửa.", email.trim())
                })
            }
            None => false,
        },
        ("remove-editor", [user_id]) => match require_my_chart(&sync).await {
            Some(chart) => {
                let result = sync.remove_editor(&chart.id, user_id).await;
                report::<RemoveEditor, _>(result, |_| EDITOR_REMOVED.to_string())
            }
            None => false,
        },
        _ => {
            eprintln!("{}", USAGE);
            bail!("Unknown command or wrong arguments: {}", args.join(" "));
        }
    };

    sync.collect_garbage();
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn parse_visibility(value: &str) -> Result<bool> {
    match value {
        "public" => Ok(true),
        "private" => Ok(false),
        other => bail!("Expected 'public' or 'private', got '{}'", other),
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Print a mutation outcome and return whether it succeeded. Errors the
/// taxonomy can name are shown as is; anything else falls back to the
/// mutation's generic message.
fn report<M, T>(result: Result<T, SyncError>, success: impl FnOnce(&T) -> String) -> bool
where
    M: Mutation,
{
    match result {
        Ok(value) => {
            println!("{}", success(&value));
            true
        }
        Err(e) => {
            warn!(mutation = M::NAME, error = %e, "command failed");
            eprintln!("{}", mutation_error_message::<M>(&e));
            false
        }
    }
}

fn mutation_error_message<M: Mutation>(error: &SyncError) -> String {
    match error {
        SyncError::Unauthenticated(_) | SyncError::InvalidCollaborator { .. } => error.to_string(),
        SyncError::RemoteFailure(e) if matches!(e.as_ref(), ApiError::Unauthorized) => {
            SESSION_EXPIRED.to_string()
        }
        _ => M::FAILURE_MESSAGE.to_string(),
    }
}

fn query_error_message(error: &SyncError) -> String {
    match error.remote() {
        Some(ApiError::Unauthorized) => SESSION_EXPIRED.to_string(),
        _ => error.to_string(),
    }
}

fn render_chart(chart: &Chart) -> String {
    let mut lines = vec![
        format!("{} [{}]", chart.display_name(), chart.visibility_label()),
        format!("  {}", chart.display_description()),
    ];
    if !chart.owner_name.is_empty() {
        lines.push(format!("  Chủ sở hữu: {}", chart.owner_name));
    }
    lines.push(format!("  Ngày tạo: {}", chart.created_at.format("%d/%m/%Y")));
    lines.push(format!("  Mã: {}", chart.id));
    lines.join("\n")
}

fn print_chart_list(result: Result<Arc<Vec<Chart>>, SyncError>, empty: &str) -> bool {
    match result {
        Ok(charts) if charts.is_empty() => {
            println!("{}", empty);
            true
        }
        Ok(charts) => {
            for chart in charts.iter() {
                println!("{}", render_chart(chart));
            }
            true
        }
        Err(e) => {
            eprintln!("{}", query_error_message(&e));
            false
        }
    }
}

/// Show the loading line when the first render has nothing to display yet.
fn print_loading<T>(state: &QueryResult<T>) {
    if state.is_loading() {
        println!("{}", LOADING);
    }
}

async fn show_my_chart(sync: &ChartSync) -> bool {
    let handle = sync.watch_my_chart();
    print_loading(&handle.state());
    match handle.settle().await {
        Ok(chart) => {
            match chart.as_ref() {
                Some(chart) => println!("{}", render_chart(chart)),
                None => println!("{}", NO_CHART),
            }
            true
        }
        Err(e) => {
            eprintln!("{}", query_error_message(&e));
            false
        }
    }
}

async fn show_edited_charts(sync: &ChartSync) -> bool {
    let handle = sync.watch_edited_charts();
    print_loading(&handle.state());
    print_chart_list(handle.settle().await, NO_SHARED_CHARTS)
}

async fn show_published_charts(sync: &ChartSync) -> bool {
    let handle = sync.watch_published_charts();
    print_loading(&handle.state());
    print_chart_list(handle.settle().await, NO_PUBLISHED_CHARTS)
}

async fn show_editors(sync: &ChartSync) -> bool {
    let Some(chart) = require_my_chart(sync).await else {
        return false;
    };
    let handle = sync.watch_editors(&chart.id, &chart.editors);
    print_loading(&handle.state());
    match handle.settle().await {
        Ok(editors) if editors.is_empty() => {
            println!("{}", NO_EDITORS);
            true
        }
        Ok(editors) => {
            for editor in editors.iter() {
                println!("{} <{}>  ({})", editor.full_name, editor.email, editor.id);
            }
            true
        }
        Err(e) => {
            eprintln!("{}", query_error_message(&e));
            false
        }
    }
}

/// The signed-in user's chart, or `None` after printing why it is missing.
async fn require_my_chart(sync: &ChartSync) -> Option<Chart> {
    match sync.my_chart().await {
        Ok(chart) => match chart.as_ref() {
            Some(chart) => Some(chart.clone()),
            None => {
                eprintln!("{}", NO_CHART);
                None
            }
        },
        Err(e) => {
            eprintln!("{}", query_error_message(&e));
            None
        }
    }
}
