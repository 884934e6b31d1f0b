use std::{net::SocketAddr, process, sync::Arc};

use deckshelf::{
    application::{
        decks::DeckService,
        error::AppError,
        render::{RenderCoordinator, RenderPoller},
        repos::{DeckViewsRepo, DecksRepo},
        shortid::ShortidAllocator,
        views::DeckViewService,
    },
    config,
    domain::deckcode::{DeckcodeParser, RuneterraDeckcodes},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        render::backends_from_settings,
        telemetry,
    },
};
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
        config::Command::Render(args) => run_render(settings, args).await,
        config::Command::Resolve(args) => run_resolve(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings)?;

    let router = http::build_router(HttpState {
        decks: app.decks,
        views: app.views,
    });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;

    info!(
        target = "deckshelf::serve",
        addr = %settings.server.addr,
        image_version = %settings.render.image_version,
        urlbox = settings.render.urlbox.is_some(),
        "listening"
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings)?;

    match app.decks.render_deck_image(&args.deckcode).await? {
        Some(image) => {
            info!(
                target = "deckshelf::render",
                deckcode = %args.deckcode,
                bytes = image.len(),
                "render completed"
            );
            println!("{} bytes", image.len());
        }
        None => println!("no image"),
    }

    Ok(())
}

async fn run_resolve(
    settings: config::Settings,
    args: config::ResolveArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings)?;

    match app.decks.ensure_deck(&args.value).await? {
        Some(deck) => {
            println!("{} {}", deck.shortid, deck.deckcode);
            Ok(())
        }
        None => Err(AppError::validation(format!(
            "`{}` is neither a known shortid nor a valid deck code",
            args.value
        ))),
    }
}

struct ApplicationContext {
    decks: Arc<DeckService>,
    views: Arc<DeckViewService>,
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let decks_repo: Arc<dyn DecksRepo> = repositories.clone();
    let views_repo: Arc<dyn DeckViewsRepo> = repositories;
    let parser: Arc<dyn DeckcodeParser> = Arc::new(RuneterraDeckcodes);

    let backends = backends_from_settings(&settings.render).map_err(InfraError::from)?;

    let allocator = ShortidAllocator::new(decks_repo.clone(), settings.shortid);
    let image_version = settings.render.image_version.as_str();
    let coordinator = RenderCoordinator::new(
        decks_repo.clone(),
        allocator.clone(),
        backends,
        image_version,
    );
    let poller = RenderPoller::new(
        decks_repo.clone(),
        image_version,
        settings.poll.max_attempts.get(),
        settings.poll.interval,
    );

    Ok(ApplicationContext {
        decks: Arc::new(DeckService::new(
            decks_repo,
            parser.clone(),
            allocator,
            coordinator,
            poller,
        )),
        views: Arc::new(DeckViewService::new(views_repo, parser)),
    })
}
