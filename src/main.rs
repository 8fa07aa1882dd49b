use std::{process, sync::Arc};

use freshline::{
    application::{
        clock::{Clock, SystemClock},
        content::ContentService,
        error::AppError,
        freshness::{FreshnessEngine, Outcome, ServeRequest, Sources},
    },
    cache::{StoreConfig, ViewStore},
    config::{self, Settings},
    domain::policy::{PolicyId, PolicyTable},
    infra::{
        error::InfraError,
        http::{self, HttpState, ViewMeta},
        source::{ClientSource, FetchSource},
        telemetry,
    },
};
use serde_json::json;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Warm(args) => run_warm(settings, args).await,
        config::Command::Show(args) => run_show(settings, args).await,
    }
}

fn build_engine(settings: &Settings) -> Result<Arc<FreshnessEngine>, InfraError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store_config = StoreConfig::from(settings);

    let fetch = FetchSource::new(&settings.source.base_url)?;
    let client = ClientSource::new(
        settings.source.base_url.clone(),
        settings.source.client_timeout,
    )?;
    let sources = Sources {
        fetch: Arc::new(ContentService::new(
            Arc::new(fetch),
            store_config.canonical_revalidate,
            clock.clone(),
        )),
        client: Arc::new(ContentService::new(
            Arc::new(client),
            store_config.canonical_revalidate,
            clock.clone(),
        )),
    };

    Ok(Arc::new(FreshnessEngine::new(
        PolicyTable::new(&settings.freshness.policy_params()),
        Arc::new(ViewStore::new(&store_config)),
        sources,
        clock,
    )))
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let engine = build_engine(&settings)?;

    if settings.freshness.precompute_on_start {
        let reports = engine
            .precompute_all(settings.freshness.precompute_concurrency.get())
            .await?;
        for report in reports {
            info!(
                target = "freshline::serve",
                policy = %report.policy,
                generated = report.generated,
                skipped = report.skipped,
                "precomputed views"
            );
        }
    }

    let router = http::build_router(HttpState { engine });
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "freshline::serve",
        addr = %settings.server.addr,
        base_url = %settings.source.base_url,
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn run_warm(settings: Settings, args: config::WarmArgs) -> Result<(), AppError> {
    let engine = build_engine(&settings)?;
    let concurrency = settings.freshness.precompute_concurrency.get();
    let policies: Vec<PolicyId> = match args.policy {
        Some(policy) => vec![policy],
        None => PolicyId::ALL.to_vec(),
    };

    info!(
        target = "freshline::warm",
        concurrency,
        policies = policies.len(),
        "starting warm"
    );

    for policy in policies {
        let report = engine.precompute(policy, concurrency).await?;
        println!(
            "{}",
            serde_json::to_string(&report)
                .map_err(|err| AppError::unexpected(format!("failed to encode report: {err}")))?
        );
    }

    info!(target = "freshline::warm", stored = engine.store().len(), "warm completed");
    Ok(())
}

async fn run_show(settings: Settings, args: config::ShowArgs) -> Result<(), AppError> {
    let engine = build_engine(&settings)?;
    let request = args
        .signals
        .iter()
        .fold(ServeRequest::new(args.post_id), |request, signal| {
            request.with_signal(signal.as_str())
        });

    let rendered = match engine.serve(args.policy, &request).await? {
        Outcome::Served(served) => json!({
            "outcome": "served",
            "meta": ViewMeta::new(&served, engine.policy(args.policy).source),
            "view": served.view.as_ref(),
        }),
        Outcome::Redirected { policy, target_id } => json!({
            "outcome": "redirected",
            "policy": policy.label(),
            "target_id": target_id,
        }),
        Outcome::Rejected {
            policy,
            post_id,
            reason,
        } => json!({
            "outcome": "rejected",
            "policy": policy.label(),
            "post_id": post_id,
            "reason": reason,
        }),
    };

    let text = serde_json::to_string_pretty(&rendered)
        .map_err(|err| AppError::unexpected(format!("failed to encode outcome: {err}")))?;
    println!("{text}");
    Ok(())
}
