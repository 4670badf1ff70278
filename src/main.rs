use cyex_upload::modules::channel::{channel_url, WsChannel, CHANNEL_NAMESPACE};
use cyex_upload::modules::existence::ExistenceChecker;
use cyex_upload::modules::serialize::load_upload_file;
use cyex_upload::modules::session::Session;
use cyex_upload::modules::upload::UploadAssembler;
use cyex_upload::modules::uploader::HttpUploader;
use simplelog::*;
use std::error::Error;
use std::fs::OpenOptions;
use std::path::Path;
use std::time::{Duration, Instant};
use log::{info, warn};
use clap::Parser;
use url::Url;

#[derive(Parser)]
#[command(
    name = "cyex-upload",
    version,
    about = "Upload a VRNetz network with its layouts to a CyEx server"
)]
struct Cli {
    #[arg(short = 'l', long = "log-file", default_value = "cyex-upload.log")]
    log_file: String,

    #[arg(short = 'u', long = "upload", default_value = "./upload.toml")]
    upload: String,

    #[arg(long = "host", help = "Overrides the host of the upload file")]
    host: Option<String>,

    #[arg(long = "no-check", help = "Skip the project existence check")]
    no_check: bool,

    #[arg(long = "check-wait-ms", default_value_t = 1500)]
    check_wait_ms: u64,

    #[arg(long = "timeout-secs", default_value_t = 300)]
    timeout_secs: u64,
}

fn init_logger(log_path: &str) -> Result<(), Box<dyn Error>> {
    WriteLogger::init(
        LevelFilter::Info,
        ConfigBuilder::new()
            .set_time_format_rfc3339()
            .build(),
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?,
    )?;
    Ok(())
}

fn check_project_name(base: &Url, session: &Session, project_name: &str, wait: Duration) -> Option<String> {
    let url = match channel_url(base) {
        Ok(url) => url,
        Err(e) => {
            warn!("Skipping existence check: {e}");
            return None;
        }
    };
    let channel = match WsChannel::connect(&url, CHANNEL_NAMESPACE, Duration::from_millis(100)) {
        Ok(channel) => channel,
        Err(e) => {
            warn!("Skipping existence check: {e}");
            return None;
        }
    };
    let mut checker = ExistenceChecker::new(channel, session);
    checker.on_name_changed(project_name);

    let deadline = Instant::now() + wait;
    while Instant::now() < deadline && checker.channel().is_connected() {
        if checker.poll() > 0 {
            break;
        }
    }
    checker.warning().map(str::to_string)
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logger(&cli.log_file)?;

    let upload = load_upload_file(&cli.upload)?;
    let base = Url::parse(cli.host.as_deref().unwrap_or(&upload.host))?;
    let session = Session::new(upload.job.clone());
    info!("Starting {session} against {base}");

    let uploader = HttpUploader::new(&base, Duration::from_secs(cli.timeout_secs))?;
    match uploader.status() {
        Ok(status) => info!("Server status: {status}"),
        Err(e) => warn!("Status probe failed: {e}"),
    }

    if !cli.no_check {
        if let Some(warning) = check_project_name(
            &base,
            &session,
            &upload.project_name,
            Duration::from_millis(cli.check_wait_ms),
        ) {
            eprintln!("{warning}");
        }
    }

    let base_dir = Path::new(&cli.upload).parent().unwrap_or(Path::new("."));
    let form = upload.to_form(base_dir)?;
    let layouts = upload.layout_list();
    for selector in layouts.selectors() {
        if let Some(config) = selector.config() {
            if !config.is_known_algorithm() {
                warn!("{selector}: unknown layout algorithm {}", config.algo);
            }
        }
    }

    let mut assembler = UploadAssembler::new(uploader, session);
    let message = assembler.on_submit(&form, layouts.selectors(), upload.overwrite)?;
    println!("{message}");
    info!("Upload finished: {}", assembler.state());

    Ok(())
}
