//! Deploy submission and finality polling

use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

use super::deploy::{DeployHash, SignedDeploy};
use super::rpc::{RpcError, RpcTransport};

/// Node error code for a deploy it has not seen yet
pub const NO_SUCH_DEPLOY: i64 = -32000;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("deploy {hash} not finalized after {attempts} attempts")]
    Timeout { hash: DeployHash, attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub attempts: u32,
    pub interval: Duration,
    /// RPC error codes that mean "not known yet, keep polling"
    pub pending_codes: Vec<i64>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: 36,
            interval: Duration::from_secs(5),
            pending_codes: vec![NO_SUCH_DEPLOY],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success { block_hash: String, cost: String },
    Failure { block_hash: String, message: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }
}

/// Send a signed deploy; returns the hash the node accepted
pub async fn submit<T: RpcTransport + ?Sized>(
    transport: &T,
    deploy: &SignedDeploy,
) -> Result<DeployHash, SubmitError> {
    let result = transport
        .call("account_put_deploy", json!({ "deploy": deploy.to_json() }))
        .await?;
    let accepted: DeployHash = result
        .get("deploy_hash")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| SubmitError::Malformed("missing deploy_hash".into()))?
        .parse()
        .map_err(|e| SubmitError::Malformed(format!("deploy_hash: {}", e)))?;
    if accepted != deploy.hash() {
        return Err(SubmitError::Malformed(format!(
            "node returned hash {} for deploy {}",
            accepted,
            deploy.hash()
        )));
    }
    tracing::info!("Submitted deploy {}", accepted);
    Ok(accepted)
}

/// Execution result if the deploy has been executed, `None` while pending
pub async fn execution_status<T: RpcTransport + ?Sized>(
    transport: &T,
    hash: DeployHash,
    pending_codes: &[i64],
) -> Result<Option<ExecutionOutcome>, SubmitError> {
    let result = match transport
        .call("info_get_deploy", json!({ "deploy_hash": hash.to_hex() }))
        .await
    {
        Ok(result) => result,
        Err(e) if e.code().map_or(false, |c| pending_codes.contains(&c)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    parse_execution(&result)
}

fn text(value: Option<&JsonValue>) -> String {
    match value {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn parse_execution(result: &JsonValue) -> Result<Option<ExecutionOutcome>, SubmitError> {
    // 1.x nodes
    if let Some(results) = result.get("execution_results").and_then(JsonValue::as_array) {
        let Some(first) = results.first() else {
            return Ok(None);
        };
        let block_hash = text(first.get("block_hash"));
        return outcome_v1(block_hash, first.get("result")).map(Some);
    }

    // 2.x nodes
    match result.get("execution_info") {
        None | Some(JsonValue::Null) => Ok(None),
        Some(info) => {
            let block_hash = text(info.get("block_hash"));
            let execution = match info.get("execution_result") {
                None | Some(JsonValue::Null) => return Ok(None),
                Some(execution) => execution,
            };
            if let Some(v2) = execution.get("Version2") {
                let outcome = match v2.get("error_message") {
                    Some(JsonValue::String(message)) => ExecutionOutcome::Failure {
                        block_hash,
                        message: message.clone(),
                    },
                    _ => ExecutionOutcome::Success {
                        block_hash,
                        cost: text(v2.get("cost").or_else(|| v2.get("consumed"))),
                    },
                };
                return Ok(Some(outcome));
            }
            outcome_v1(block_hash, execution.get("Version1")).map(Some)
        }
    }
}

fn outcome_v1(
    block_hash: String,
    result: Option<&JsonValue>,
) -> Result<ExecutionOutcome, SubmitError> {
    let result = result.ok_or_else(|| SubmitError::Malformed("missing execution result".into()))?;
    if let Some(success) = result.get("Success") {
        return Ok(ExecutionOutcome::Success {
            block_hash,
            cost: text(success.get("cost")),
        });
    }
    if let Some(failure) = result.get("Failure") {
        return Ok(ExecutionOutcome::Failure {
            block_hash,
            message: text(failure.get("error_message")),
        });
    }
    Err(SubmitError::Malformed(format!("execution result {}", result)))
}

/// Poll until the deploy executes or attempts run out. A failed execution
/// is returned as soon as it is seen.
pub async fn await_finality<T: RpcTransport + ?Sized>(
    transport: &T,
    hash: DeployHash,
    config: &PollConfig,
) -> Result<ExecutionOutcome, SubmitError> {
    for attempt in 1..=config.attempts {
        if let Some(outcome) = execution_status(transport, hash, &config.pending_codes).await? {
            match &outcome {
                ExecutionOutcome::Success { cost, .. } => {
                    tracing::info!("Deploy {} executed (cost {})", hash, cost)
                }
                ExecutionOutcome::Failure { message, .. } => {
                    tracing::warn!("Deploy {} failed: {}", hash, message)
                }
            }
            return Ok(outcome);
        }
        tracing::debug!("Deploy {} pending ({}/{})", hash, attempt, config.attempts);
        if attempt < config.attempts {
            tokio::time::sleep(config.interval).await;
        }
    }
    Err(SubmitError::Timeout {
        hash,
        attempts: config.attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::address::{Address, PublicKey, ADDRESS_LENGTH};
    use crate::chain::deploy::{DeployBuilder, DeployConfig, Session, SignOutcome};
    use crate::chain::rpc::mock::MockTransport;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn hash() -> DeployHash {
        DeployHash::new([0x5d; 32])
    }

    fn quick(attempts: u32) -> PollConfig {
        PollConfig {
            attempts,
            interval: Duration::ZERO,
            ..PollConfig::default()
        }
    }

    fn pending() -> RpcError {
        RpcError::Rpc {
            code: NO_SUCH_DEPLOY,
            message: "No such deploy".into(),
        }
    }

    /// Answers with `pending()` until call `ready_at`, then with `result`
    fn scripted(ready_at: u32, result: JsonValue) -> MockTransport {
        let counter = AtomicU32::new(0);
        MockTransport::new(move |method, _| {
            assert_eq!(method, "info_get_deploy");
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n < ready_at {
                Err(pending())
            } else {
                Ok(result.clone())
            }
        })
    }

    #[tokio::test]
    async fn test_success_after_pending() {
        let transport = scripted(
            3,
            json!({"deploy": {}, "execution_results": [
                {"block_hash": "bb", "result": {"Success": {"cost": "123", "effect": {}}}}
            ]}),
        );
        let outcome = await_finality(&transport, hash(), &quick(5)).await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Success {
                block_hash: "bb".into(),
                cost: "123".into()
            }
        );
        assert_eq!(transport.calls_to("info_get_deploy"), 3);
    }

    #[tokio::test]
    async fn test_failure_surfaces_immediately() {
        let transport = scripted(
            2,
            json!({"execution_results": [
                {"block_hash": "bb", "result": {"Failure": {"cost": "1", "error_message": "User error: 4"}}}
            ]}),
        );
        let outcome = await_finality(&transport, hash(), &quick(10)).await.unwrap();
        assert!(!outcome.is_success());
        assert_eq!(transport.calls_to("info_get_deploy"), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_bounded() {
        let transport = scripted(u32::MAX, json!({}));
        let result = await_finality(&transport, hash(), &quick(4)).await;
        assert!(matches!(result, Err(SubmitError::Timeout { attempts: 4, .. })));
        assert_eq!(transport.calls_to("info_get_deploy"), 4);
    }

    #[tokio::test]
    async fn test_known_but_unexecuted_is_pending() {
        let transport = scripted(1, json!({"deploy": {}, "execution_results": []}));
        let result = await_finality(&transport, hash(), &quick(2)).await;
        assert!(matches!(result, Err(SubmitError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_other_rpc_errors_propagate() {
        let transport = MockTransport::new(|_, _| {
            Err(RpcError::Rpc {
                code: -32602,
                message: "invalid params".into(),
            })
        });
        let result = await_finality(&transport, hash(), &quick(3)).await;
        assert!(matches!(result, Err(SubmitError::Rpc(_))));
        assert_eq!(transport.calls_to("info_get_deploy"), 1);
    }

    #[test]
    fn test_execution_info_shapes() {
        let v2_ok = json!({"execution_info": {"block_hash": "cc", "execution_result": {
            "Version2": {"error_message": null, "cost": "77", "consumed": "70"}
        }}});
        assert_eq!(
            parse_execution(&v2_ok).unwrap(),
            Some(ExecutionOutcome::Success {
                block_hash: "cc".into(),
                cost: "77".into()
            })
        );

        let v2_err = json!({"execution_info": {"block_hash": "cc", "execution_result": {
            "Version2": {"error_message": "Out of gas", "cost": "77"}
        }}});
        assert!(matches!(
            parse_execution(&v2_err).unwrap(),
            Some(ExecutionOutcome::Failure { message, .. }) if message == "Out of gas"
        ));

        let v1_in_v2 = json!({"execution_info": {"block_hash": "dd", "execution_result": {
            "Version1": {"Success": {"cost": "5"}}
        }}});
        assert!(parse_execution(&v1_in_v2).unwrap().unwrap().is_success());

        assert_eq!(parse_execution(&json!({"execution_info": null})).unwrap(), None);
    }

    fn signed() -> SignedDeploy {
        let key = PublicKey::Ed25519([1; 32]);
        let deploy = DeployBuilder::new(DeployConfig::default())
            .account(key)
            .session(Session::Contract {
                hash: Address::contract([2; ADDRESS_LENGTH]),
            })
            .entry_point("sync")
            .payment(1_000_000_000u64)
            .build_at(1_700_000_000_000)
            .unwrap();
        match deploy
            .approve(&key, &json!(hex::encode([3u8; 64])), 1_700_000_000_000)
            .unwrap()
        {
            SignOutcome::Signed(signed) => signed,
            SignOutcome::Cancelled => panic!("not cancelled"),
        }
    }

    #[tokio::test]
    async fn test_submit_checks_returned_hash() {
        let deploy = signed();
        let expected = deploy.hash().to_hex();
        let transport = Arc::new(MockTransport::new(move |method, params| {
            assert_eq!(method, "account_put_deploy");
            assert_eq!(params["deploy"]["approvals"].as_array().map(Vec::len), Some(1));
            Ok(json!({"api_version": "1.5.6", "deploy_hash": expected}))
        }));
        assert_eq!(submit(&transport, &deploy).await.unwrap(), deploy.hash());

        let wrong = MockTransport::new(|_, _| Ok(json!({"deploy_hash": "00".repeat(32)})));
        assert!(matches!(
            submit(&wrong, &deploy).await,
            Err(SubmitError::Malformed(_))
        ));
    }
}
