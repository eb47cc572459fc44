//! Grievance Insights - analytics and live signals for a grievance tracking dashboard.
//!
//! # API Endpoints
//!
//! - `GET /reports` - Report views for managers and admins
//! - `GET /notifications` - Active notifications
//! - `DELETE /notifications/:id` - Dismiss a notification
//! - `GET /notifications/connection` - Hub connection state
//! - `GET|POST|DELETE /chat` - Assistant chat
//! - `GET /health` - Health check

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use grievance_insights::api::{AppState, router};
use grievance_insights::chat::{ChatDesk, ChatRelay};
use grievance_insights::config::Config;
use grievance_insights::dashboard::Dashboard;
use grievance_insights::data_sources::{ComplaintsClient, GenerativeClient};
use grievance_insights::notifications::NotificationCenter;
use grievance_insights::push::{PushChannel, PushConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("grievance_insights=info".parse()?))
        .init();

    let config = Config::from_env();

    info!(
        port = config.port,
        api_url = %config.api_url,
        hub_url = %config.hub_url,
        model = %config.gemini_model,
        "Starting Grievance Insights"
    );

    let notifications = NotificationCenter::new();

    // Hub connection failures are logged by the channel and never stop startup
    let subscription = config.push_enabled.then(|| {
        let mut push_config = PushConfig::new(&config.hub_url);
        push_config.access_token = config.hub_token.clone();
        push_config.skip_negotiation = config.hub_skip_negotiation;
        notifications
            .attach(PushChannel::new(push_config))
            .start()
    });

    let relay = ChatRelay::new(GenerativeClient::with_base_url(
        &config.gemini_api_url,
        &config.gemini_model,
        &config.gemini_api_key,
    ));

    let state = AppState {
        dashboard: Dashboard::new(ComplaintsClient::with_base_url(&config.api_url)),
        notifications: notifications.clone(),
        chat: ChatDesk::new(relay),
        push_state: subscription.as_ref().map(|s| s.states()),
    };

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Grievance Insights is listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(subscription) = subscription {
        subscription.unsubscribe().await;
    }
    notifications.clear();

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
