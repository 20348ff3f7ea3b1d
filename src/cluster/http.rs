use super::protocol::ENDPOINT_COMMAND;
use super::transport::Transport;
use super::types::{Address, Response, RpcOptions};
use crate::commands::CommandEnvelope;
use crate::error::RpcError;

use async_trait::async_trait;

/// Transport posting commands to peers over HTTP.
///
/// Membership is static: the local address plus the peers given at start-up.
/// No retries are attempted, a command either gets one answer or fails.
pub struct HttpTransport {
    local: Address,
    members: Vec<Address>,
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(local: Address, peers: Vec<Address>) -> Self {
        let mut members = peers;
        if !members.contains(&local) {
            members.push(local.clone());
        }
        members.sort();
        members.dedup();

        Self {
            local,
            members,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn local_address(&self) -> Address {
        self.local.clone()
    }

    fn members(&self) -> Vec<Address> {
        self.members.clone()
    }

    async fn invoke(
        &self,
        target: &Address,
        command: CommandEnvelope,
        options: &RpcOptions,
    ) -> Result<Response, RpcError> {
        if !self.members.contains(target) {
            return Err(RpcError::NoSuchNode(target.clone()));
        }

        let url = format!("http://{}{}", target, ENDPOINT_COMMAND);
        let call = async {
            let response = self
                .http_client
                .post(url)
                .json(&command)
                .send()
                .await
                .map_err(|e| RpcError::Unreachable {
                    address: target.clone(),
                    message: e.to_string(),
                })?;

            if !response.status().is_success() {
                return Err(RpcError::Unreachable {
                    address: target.clone(),
                    message: format!("command endpoint returned {}", response.status()),
                });
            }

            response
                .json::<Response>()
                .await
                .map_err(|e| RpcError::Unreachable {
                    address: target.clone(),
                    message: e.to_string(),
                })
        };

        match tokio::time::timeout(options.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Command {} to {} timed out", command.tag, target);
                Err(RpcError::Timeout {
                    address: target.clone(),
                    timeout: options.timeout,
                })
            }
        }
    }
}
