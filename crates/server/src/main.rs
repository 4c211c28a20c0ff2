//! Parley server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use apalis::layers::retry::RetryPolicy;
use apalis::prelude::*;
use axum::{Router, middleware};
use parley_api::{AppState, SseBroadcaster, SseEvent, router as api_router};
use parley_common::Config;
use parley_core::{
    ChannelDeliverer, CommentService, EventPublisherService, NotificationDelivererService,
    NotificationDispatcherService, NotificationQueue, NotificationService, PostService,
    UserService,
};
use parley_db::repositories::{
    CommentMentionRepository, CommentRepository, NotificationRepository, PostRepository,
    UserRepository,
};
use parley_queue::{
    NotifyContext, NotifyJob, PubSubEvent, PubSubSseBridge, RedisNotificationDispatcher,
    RedisPubSub, notify_worker,
};
use tokio::signal;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often idle SSE channels are dropped.
const SSE_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// How long shutdown waits for queued notifications.
const QUEUE_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Notification delivery wiring picked at startup.
struct Delivery {
    dispatcher: NotificationDispatcherService,
    /// In-process queue task, drained on shutdown.
    local_queue: Option<JoinHandle<()>>,
}

/// Deliver through Redis: apalis jobs for the work, Pub/Sub for live fan-out.
async fn redis_delivery(
    config: &Config,
    redis_config: &parley_common::config::RedisConfig,
    notification_service: NotificationService,
    sse_broadcaster: &SseBroadcaster,
) -> Result<Delivery, Box<dyn std::error::Error>> {
    info!("Connecting to Redis...");
    let redis_client = redis::Client::open(redis_config.url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    let storage = apalis_redis::RedisStorage::<NotifyJob>::new(redis_conn);
    info!("Connected to Redis job queue");

    let pubsub = Arc::new(RedisPubSub::new(&redis_config.url, &redis_config.prefix).await?);
    pubsub.start().await?;

    let broadcaster = sse_broadcaster.clone();
    PubSubSseBridge::new(Arc::clone(&pubsub)).start(move |event| {
        let broadcaster = broadcaster.clone();
        tokio::spawn(async move {
            match event {
                PubSubEvent::Mention {
                    recipient_id,
                    notification,
                } => {
                    broadcaster
                        .broadcast_to_user(&recipient_id, SseEvent::Mention(notification))
                        .await;
                }
            }
        });
    });

    let publisher: EventPublisherService = pubsub;
    let deliverer: NotificationDelivererService =
        Arc::new(ChannelDeliverer::new(notification_service, publisher));
    let notify_ctx = NotifyContext::new(deliverer);

    let retries = config.notifications.max_attempts.saturating_sub(1) as usize;
    let concurrency = config.notifications.workers.max(1);
    let worker_storage = storage.clone();

    tokio::spawn(async move {
        let monitor = Monitor::new().register({
            WorkerBuilder::new("notify")
                .enable_tracing()
                .retry(RetryPolicy::retries(retries))
                .concurrency(concurrency)
                .data(notify_ctx)
                .backend(worker_storage)
                .build_fn(notify_worker)
        });

        if let Err(e) = monitor.run().await {
            error!(error = %e, "Notify worker failed");
        }
    });
    info!(retries, concurrency, "Notify worker started");

    Ok(Delivery {
        dispatcher: Arc::new(RedisNotificationDispatcher::new(
            storage,
            &config.notifications,
        )),
        local_queue: None,
    })
}

/// Deliver in-process with a bounded queue and the local SSE broadcaster.
fn local_delivery(
    config: &Config,
    notification_service: NotificationService,
    sse_broadcaster: &SseBroadcaster,
) -> Delivery {
    let publisher: EventPublisherService = Arc::new(sse_broadcaster.clone());
    let deliverer: NotificationDelivererService =
        Arc::new(ChannelDeliverer::new(notification_service, publisher));

    let queue = NotificationQueue::new(&config.notifications);
    let sender = queue.sender();
    let handle = queue.start(deliverer);
    info!(
        capacity = config.notifications.queue_capacity,
        workers = config.notifications.workers,
        "In-process notification queue started"
    );

    Delivery {
        dispatcher: Arc::new(sender),
        local_queue: Some(handle),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting parley server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = Arc::new(parley_db::init(&config).await?);
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    parley_db::migrate(&db).await?;
    info!("Migrations completed");

    // Initialize repositories
    let user_repo = UserRepository::new(Arc::clone(&db));
    let post_repo = PostRepository::new(Arc::clone(&db));
    let comment_repo = CommentRepository::new(Arc::clone(&db));
    let mention_repo = CommentMentionRepository::new(Arc::clone(&db));
    let notification_repo = NotificationRepository::new(Arc::clone(&db));

    let notification_service = NotificationService::new(notification_repo);
    let sse_broadcaster = SseBroadcaster::new();

    // Pick the notification pipeline
    let Delivery {
        dispatcher,
        local_queue,
    } = match &config.redis {
        Some(redis) => {
            redis_delivery(&config, redis, notification_service.clone(), &sse_broadcaster).await?
        }
        None => {
            warn!("No Redis configured, notifications are queued in-process");
            local_delivery(&config, notification_service.clone(), &sse_broadcaster)
        }
    };

    let state = AppState {
        server: config.server.clone(),
        user_service: UserService::new(user_repo.clone()),
        post_service: PostService::new(post_repo.clone()),
        comment_service: CommentService::new(
            comment_repo,
            post_repo,
            user_repo,
            mention_repo,
            dispatcher,
        ),
        notification_service,
        sse_broadcaster: sse_broadcaster.clone(),
    };

    // Periodically drop SSE channels nobody listens to
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SSE_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            sse_broadcaster.cleanup().await;
        }
    });

    // Build router
    let app = Router::new()
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            parley_api::middleware::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router held the last queue senders; wait for the queue to drain
    if let Some(handle) = local_queue {
        info!("Draining notification queue...");
        if tokio::time::timeout(QUEUE_DRAIN_TIMEOUT, handle).await.is_err() {
            warn!("Notification queue did not drain in time");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
