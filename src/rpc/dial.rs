//! Endpoint selection and dialing

use std::time::Duration;
use tokio::net::TcpStream;

use crate::balancer::P2cSelector;
use crate::errors::{GatewayError, GatewayResult};
use crate::logger::{self, LogTag};

/// Pick a replica with the P2C selector and confirm it accepts a connection
/// within `timeout`
///
/// Returns the chosen endpoint. The probe connection is closed immediately;
/// callers open their own request against the endpoint.
pub async fn dial_endpoint(
    selector: &P2cSelector,
    endpoints: &[String],
    timeout: Duration,
) -> GatewayResult<String> {
    let endpoint = selector.select(endpoints)?;

    match tokio::time::timeout(timeout, TcpStream::connect(endpoint.as_str())).await {
        Ok(Ok(_stream)) => {
            logger::debug(LogTag::Rpc, &format!("Dialed {}", endpoint));
            Ok(endpoint)
        }
        Ok(Err(e)) => {
            logger::warning(LogTag::Rpc, &format!("Dial {} failed: {}", endpoint, e));
            Err(GatewayError::unavailable(endpoint, e))
        }
        Err(_) => {
            logger::warning(
                LogTag::Rpc,
                &format!("Dial {} timed out after {}ms", endpoint, timeout.as_millis()),
            );
            Err(GatewayError::timeout(format!("dial {}", endpoint), timeout))
        }
    }
}
