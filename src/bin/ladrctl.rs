use chrono::NaiveDate;
use dotenv::dotenv;
use exitfailure::ExitFailure;
use failure::ResultExt;
use ladr::analytics::{self, DateRange};
use ladr::config::{self, StorageOpts};
use ladr::display;
use ladr::gateway::Gateway;
use ladr::models::*;
use serde_json::{json, Value};
use std::io::stdin;
use structopt::StructOpt;

#[derive(StructOpt)]
enum Command {
    /// Error rate of one student on one exam paper
    ErrorRate {
        #[structopt(long, default_value = "1")]
        student_id: i32,
        exam_paper_id: i32,
    },
    /// Per-exam and weekly error rates between two dates
    Trend {
        #[structopt(long, default_value = "1")]
        student_id: i32,
        start: NaiveDate,
        end: NaiveDate,
    },
    Exam { id: i32 },
    /// Run a gateway request and print the envelope
    Request {
        method: String,
        endpoint: String,
        body: Option<String>,
    },
    /// Create a login user, reading the password from stdin
    AddUser { username: String },
    ListFiles {
        #[structopt(long, default_value = "uploads/")]
        prefix: String,
    },
    PurgeExam { id: i32 },
    Bucket,
}

#[derive(StructOpt)]
struct Args {
    #[structopt(short, long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,
    #[structopt(flatten)]
    storage: StorageOpts,
    #[structopt(subcommand)]
    command: Command,
}

fn gateway(url: Option<&str>) -> Result<Gateway, failure::Error> {
    let url = url.ok_or_else(|| failure::err_msg("DATABASE_URL is not set"))?;
    let pool = config::pool(url).context("unable to connect database")?;
    Ok(Gateway::new(pool))
}

fn print_envelope(envelope: &impl serde::Serialize) -> Result<(), failure::Error> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), ExitFailure> {
    env_logger::init();
    let _ = dotenv();
    let args = Args::from_args();
    let url = args.database_url.as_deref();
    let store = args.storage.object_store();
    match args.command {
        Command::ErrorRate {
            student_id,
            exam_paper_id,
        } => {
            let questions = gateway(url)?.fetch_all::<Question>();
            let report = analytics::error_rate(student_id, exam_paper_id, &questions);
            print!("{}", display::error_rate_report(&report));
        }
        Command::Trend {
            student_id,
            start,
            end,
        } => {
            let range = DateRange::new(start, end)?;
            let gateway = gateway(url)?;
            let exams = gateway.fetch_all::<ExamPaper>();
            let questions = gateway.fetch_all::<Question>();
            let trend = analytics::trend(student_id, &range, &exams, &questions);
            print!("{}", display::trend_report(&trend));
        }
        Command::Exam { id } => {
            let gateway = gateway(url)?;
            let exams = gateway.fetch_all::<ExamPaper>();
            let images = gateway.fetch_all::<ExamPaperImage>();
            let questions = gateway.fetch_all::<Question>();
            let detail = analytics::exam_detail(id, &exams, &images, &questions)
                .ok_or_else(|| failure::format_err!("exam paper {} not found", id))?;
            print!("{}", display::exam_report(&detail));
            for image in &detail.images {
                println!(
                    "  page {}: {}",
                    image.upload_order.unwrap_or(0),
                    store.display_url(&image.image_url)
                );
            }
        }
        Command::Request {
            method,
            endpoint,
            body,
        } => {
            let body = body
                .map(|b| serde_json::from_str::<Value>(&b))
                .transpose()
                .context("request body is not valid JSON")?;
            print_envelope(&gateway(url)?.request(&method, &endpoint, body))?;
        }
        Command::AddUser { username } => {
            println!("Enter password:");
            let mut password = String::new();
            stdin().read_line(&mut password)?;
            let password = password.trim_end_matches(&['\r', '\n'][..]);
            if password.is_empty() {
                return Err(failure::err_msg("password must not be empty").into());
            }
            let body = json!({ "username": username, "password": password });
            print_envelope(&gateway(url)?.request("POST", "users", Some(body)))?;
        }
        Command::ListFiles { prefix } => {
            println!("{}/{}", store.bucket(), prefix);
            for obj in store.list_files(&prefix).await {
                println!("{:>10}  {}  {}", obj.size, obj.last_modified, obj.key);
            }
        }
        Command::PurgeExam { id } => {
            let deleted = store.purge_exam_paper_images(id).await?;
            println!("deleted {} images of exam paper {}", deleted, id);
        }
        Command::Bucket => {
            let info = store.bucket_info().await?;
            println!("bucket:  {} ({})", info.bucket, store.region());
            println!("files:   {}", info.file_count);
            println!("size:    {} MB", info.total_size_mb);
        }
    }
    Ok(())
}
