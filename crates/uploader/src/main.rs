use anyhow::{Context, Result};
use clap::Parser;
use dugong_client_sdk::{format_remaining, DetectionResult};
use dugong_uploader::{
    now_ms, ClientConfig, Countdown, CyclePhase, Dashboard, HttpDetectionApi, StateStore,
    WatchOutcome, DEFAULT_API_URL, DEFAULT_DATA_DIR,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "dugong-uploader",
    version,
    about = "Upload dugong survey images and browse detection results"
)]
struct Args {
    #[arg(long, global = true, env = "DUGONG_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    #[arg(long, global = true, env = "DUGONG_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    Login(LoginArgs),
    Logout,
    Status(StatusArgs),
    Upload(UploadArgs),
    Results(ResultsArgs),
    Next,
    Prev,
    Select(SelectArgs),
    Export(ExportArgs),
    MarkPoor,
    Watch,
}

#[derive(Parser, Debug)]
struct LoginArgs {
    #[arg(long)]
    email: String,

    #[arg(long, env = "DUGONG_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Parser, Debug)]
struct UploadArgs {
    #[arg(required = true, num_args = 1..)]
    files: Vec<PathBuf>,

    #[arg(long)]
    poll_attempts: Option<u32>,

    #[arg(long)]
    poll_interval_ms: Option<u64>,
}

#[derive(Parser, Debug)]
struct StatusArgs {
    /// Re-read the session from the server even when results are cached.
    #[arg(long)]
    refresh: bool,
}

#[derive(Parser, Debug)]
struct ResultsArgs {
    #[arg(long)]
    all: bool,

    /// Re-read the session from the server; resets the browsing position.
    #[arg(long)]
    refresh: bool,
}

#[derive(Parser, Debug)]
struct SelectArgs {
    position: usize,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = ClientConfig::new(args.api_url.clone(), args.data_dir.clone());
    let mut dashboard = open_dashboard(&config)?;
    if !dashboard.ensure_live().await? {
        eprintln!("session expired, logged out");
    }

    match args.command {
        Commands::Login(login) => run_login(&mut dashboard, login).await,
        Commands::Logout => run_logout(&mut dashboard).await,
        Commands::Status(status) => run_status(&mut dashboard, status).await,
        Commands::Upload(upload) => run_upload(&mut dashboard, &config, upload).await,
        Commands::Results(results) => run_results(&mut dashboard, results).await,
        Commands::Next => {
            dashboard.next()?;
            print_current(&dashboard);
            Ok(())
        }
        Commands::Prev => {
            dashboard.previous()?;
            print_current(&dashboard);
            Ok(())
        }
        Commands::Select(select) => {
            dashboard.select(select.position)?;
            print_current(&dashboard);
            Ok(())
        }
        Commands::Export(export) => {
            let path = dashboard.export_csv(&export.out_dir).await?;
            println!("export complete path={}", path.display());
            Ok(())
        }
        Commands::MarkPoor => {
            let name = dashboard.mark_poor_quality().await?;
            println!("marked poor quality image={name}");
            Ok(())
        }
        Commands::Watch => run_watch(&mut dashboard).await,
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_dashboard(config: &ClientConfig) -> Result<Dashboard<HttpDetectionApi>> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
    let api = HttpDetectionApi::new(&config.api_url, config.request_timeout)?;
    let store = StateStore::open(&config.state_path())
        .with_context(|| format!("opening state under {}", config.data_dir.display()))?;
    Ok(Dashboard::open(Arc::new(api), store, config)?)
}

async fn run_login(dashboard: &mut Dashboard<HttpDetectionApi>, args: LoginArgs) -> Result<()> {
    dashboard.login(&args.email, &args.password).await?;
    let auth = dashboard.auth();
    println!(
        "login complete user={} email={} session={}",
        auth.display_name(),
        auth.display_email(),
        dashboard.upload().session_id().unwrap_or("-")
    );
    Ok(())
}

async fn run_logout(dashboard: &mut Dashboard<HttpDetectionApi>) -> Result<()> {
    dashboard.logout().await?;
    println!("logout complete");
    Ok(())
}

async fn run_status(dashboard: &mut Dashboard<HttpDetectionApi>, args: StatusArgs) -> Result<()> {
    let auth = dashboard.auth();
    if !auth.is_authenticated() {
        println!("not logged in");
        return Ok(());
    }
    println!(
        "user={} ({}) email={}",
        auth.display_name(),
        auth.initials(),
        auth.display_email()
    );
    match dashboard.countdown(now_ms()) {
        Some(countdown) => println!(
            "session={} remaining={} urgency={}",
            dashboard.upload().session_id().unwrap_or("-"),
            format_remaining(countdown.remaining_secs),
            countdown.urgency.label()
        ),
        None => println!("session=-"),
    }
    let results = dashboard.load_results(args.refresh).await;
    println!("results={results}");
    print_current(dashboard);
    Ok(())
}

async fn run_upload(
    dashboard: &mut Dashboard<HttpDetectionApi>,
    config: &ClientConfig,
    args: UploadArgs,
) -> Result<()> {
    let policy = config
        .poll
        .with_overrides(args.poll_attempts, args.poll_interval_ms);
    dashboard.orchestrator_mut().set_policy(policy);

    let staged = dashboard.stage_files(&args.files).await?;
    for (name, reason) in &staged.skipped {
        eprintln!("skipped file={name} reason={reason}");
    }
    println!("staged files={}", staged.staged.len());

    let mut phases = dashboard.orchestrator_mut().subscribe();
    let printer = tokio::spawn(async move {
        while phases.changed().await.is_ok() {
            let phase = *phases.borrow_and_update();
            if phase != CyclePhase::Idle {
                println!("upload phase={phase:?}");
            }
        }
    });

    let result = dashboard.confirm_upload().await;
    printer.abort();
    let report = result?;
    println!(
        "upload complete session={} files={} baseline={} results={} attempts={}",
        report.session_id,
        report.files_uploaded,
        report.baseline_results,
        report.final_results,
        report.attempts
    );
    print_current(dashboard);
    Ok(())
}

async fn run_results(dashboard: &mut Dashboard<HttpDetectionApi>, args: ResultsArgs) -> Result<()> {
    dashboard.load_results(args.refresh).await;
    let images = dashboard.images();
    if images.total_images() == 0 {
        println!("no results");
        return Ok(());
    }
    if args.all {
        for (idx, result) in images.results().iter().enumerate() {
            print_result(idx + 1, images.total_images(), result);
        }
    } else {
        print_current(dashboard);
    }
    Ok(())
}

async fn run_watch(dashboard: &mut Dashboard<HttpDetectionApi>) -> Result<()> {
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let outcome = dashboard
        .watch(
            |countdown: Countdown| {
                println!(
                    "session remaining={} urgency={}",
                    format_remaining(countdown.remaining_secs),
                    countdown.urgency.label()
                );
            },
            shutdown,
        )
        .await?;
    match outcome {
        WatchOutcome::Expired => println!("session expired, logged out"),
        WatchOutcome::Stopped => println!("watch stopped"),
        WatchOutcome::NoSession => println!("no active session"),
    }
    Ok(())
}

fn print_current(dashboard: &Dashboard<HttpDetectionApi>) {
    let images = dashboard.images();
    if let Some(result) = images.current_item() {
        print_result(images.cursor(), images.total_images(), result);
    }
}

fn print_result(position: usize, total: usize, result: &DetectionResult) {
    println!(
        "image {}/{} name={} dugongs={} calves={} total={} class={} captured={} created={}",
        position,
        total,
        result.image_name(),
        result.dugong_count,
        result.calf_count,
        result.total_count(),
        result.image_class,
        result.captured_date(),
        result.created_at
    );
}
