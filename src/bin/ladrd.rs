use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{middleware, web, App, HttpServer};
use failure::ResultExt;
use ladr::config::{self, LoginOpts, Settings, StorageOpts};
use ladr::dashboard::DashboardCache;
use ladr::gateway::Gateway;
use ladr::routes;
use log::info;
use std::net::SocketAddr;
use std::time::Duration;
use structopt::StructOpt;

fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(3600)
}

#[derive(StructOpt)]
struct Args {
    #[structopt(short, long, default_value = "0.0.0.0:5000")]
    bind: SocketAddr,
    /// Require basic auth on the /api scope
    #[structopt(short = "a", long)]
    do_auth: bool,
    #[structopt(long, default_value = "30")]
    cache_ttl_secs: u64,
    #[structopt(long, default_value = "1")]
    default_student_id: i32,
    #[structopt(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,
    #[structopt(flatten)]
    storage: StorageOpts,
    #[structopt(flatten)]
    login: LoginOpts,
}

#[actix_rt::main]
async fn main() -> Result<(), exitfailure::ExitFailure> {
    env_logger::init();
    let _ = dotenv::dotenv();
    let args = Args::from_args();

    if args.do_auth && args.login.password.is_empty() {
        return Err(failure::err_msg("--do-auth requires LOGIN_PASSWORD to be set").into());
    }

    let pool = config::pool(&args.database_url).context("unable to build database pool")?;
    let gateway = web::Data::new(Gateway::new(pool.clone()));
    let pool = web::Data::new(pool);
    let store = web::Data::new(args.storage.object_store());
    let login = web::Data::new(args.login.credentials());
    let settings = web::Data::new(Settings {
        default_student_id: args.default_student_id,
    });
    let cache = web::Data::new(DashboardCache::new(Duration::from_secs(
        args.cache_ttl_secs,
    )));
    let do_auth = args.do_auth;

    info!(
        "serving bucket {} on {} (auth {})",
        args.storage.bucket,
        args.bind,
        if do_auth { "on" } else { "off" }
    );
    HttpServer::new(move || {
        App::new()
            .app_data(pool.clone())
            .app_data(gateway.clone())
            .app_data(store.clone())
            .app_data(login.clone())
            .app_data(settings.clone())
            .app_data(cache.clone())
            .configure(|cfg| routes::configure(cfg, do_auth))
            .wrap(cors())
            .wrap(middleware::Logger::default())
    })
    .bind(&args.bind)?
    .run()
    .await?;
    Ok(())
}
