//! Bounded concurrent fan-out of one call per endpoint
//!
//! A phase issues every call at once, bounded by the configured sizing, and
//! only returns after each call has completed, failed or timed out.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::change::NomadChange;
use crate::error::EndpointError;

use super::config::NomadClientConfig;
use super::endpoint::{NodeAddress, NomadEndpoint};

/// Run `call` once per target and collect the results in target order
pub(crate) async fn fan_out<C, I, R, F, Fut>(
    config: &NomadClientConfig,
    operation: &'static str,
    targets: Vec<(Arc<dyn NomadEndpoint<C>>, I)>,
    call: F,
) -> Vec<(NodeAddress, Result<R, EndpointError>)>
where
    C: NomadChange,
    F: Fn(Arc<dyn NomadEndpoint<C>>, I) -> Fut,
    Fut: Future<Output = Result<R, EndpointError>> + Send + 'static,
    R: Send + 'static,
{
    let workers = config.sizing().thread_count(targets.len());
    trace!(
        "Running {} on {} nodes with {} workers",
        operation,
        targets.len(),
        workers
    );

    let permits = Arc::new(Semaphore::new(workers));
    let connect_timeout = config.connect_timeout;
    let request_timeout = config.request_timeout;

    let mut addresses = Vec::with_capacity(targets.len());
    let mut handles = Vec::with_capacity(targets.len());

    for (endpoint, input) in targets {
        addresses.push(endpoint.address().clone());
        let request = call(endpoint.clone(), input);
        let permits = permits.clone();

        handles.push(tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| EndpointError::Connection(e.to_string()))?;

            match timeout(connect_timeout, endpoint.connect()).await {
                Ok(connected) => connected?,
                Err(_) => {
                    return Err(EndpointError::Timeout {
                        operation: "connect".to_string(),
                        millis: connect_timeout.as_millis(),
                    });
                }
            }

            match timeout(request_timeout, request).await {
                Ok(result) => result,
                Err(_) => Err(EndpointError::Timeout {
                    operation: operation.to_string(),
                    millis: request_timeout.as_millis(),
                }),
            }
        }));
    }

    let results = join_all(handles).await;

    addresses
        .into_iter()
        .zip(results)
        .map(|(address, joined)| {
            let result = joined.unwrap_or_else(|e| {
                Err(EndpointError::Remote(format!("{operation} task failed: {e}")))
            });
            if let Err(e) = &result {
                debug!("{} failed on {}: {}", operation, address, e);
            }
            (address, result)
        })
        .collect()
}
