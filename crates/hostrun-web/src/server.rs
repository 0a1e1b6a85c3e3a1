use axum::serve;
use tokio::net::TcpListener;
use tracing::info;

use crate::error::WebError;
use crate::routes::router;
use crate::state::WebState;

pub async fn run_web_server(bind_addr: &str, state: WebState) -> Result<(), WebError> {
    let listener = TcpListener::bind(bind_addr).await?;
    serve_listener(listener, state).await
}

pub async fn serve_listener(listener: TcpListener, state: WebState) -> Result<(), WebError> {
    info!(addr = %listener.local_addr()?, "hostrun server listening");
    serve(listener, router(state))
        .await
        .map_err(|err| WebError::Internal {
            message: err.to_string(),
        })?;
    Ok(())
}
