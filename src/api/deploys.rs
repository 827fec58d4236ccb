//! Deploy lifecycle endpoints: build, approve, submit, status

use axum::{
    extract::{Path, State},
    Json,
};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::api::store::PendingDeploy;
use crate::api::AppState;
use crate::chain::address::{Address, PublicKey};
use crate::chain::clvalue::{Arg, CLType};
use crate::chain::deploy::{format_timestamp, now_ms, DeployBuilder, DeployHash, Session, SignOutcome};
use crate::chain::signature::{normalize_reply, Normalized, SignError};
use crate::chain::submit::{self, ExecutionOutcome};
use crate::types::{ApiError, ApiResult};

fn parse_hash(hash: &str) -> ApiResult<DeployHash> {
    hash.parse()
        .map_err(|e| ApiError::BadRequest(format!("deploy hash: {}", e)))
}

fn parse_key(what: &str, key: &str) -> ApiResult<PublicKey> {
    PublicKey::from_hex(key).map_err(|e| ApiError::BadRequest(format!("{}: {}", what, e)))
}

fn not_pending(hash: &DeployHash) -> ApiError {
    ApiError::NotFound(format!("no pending deploy {}", hash))
}

#[derive(Debug, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    /// CLType in the node's JSON form, e.g. `"U256"` or `{"Option": "Key"}`
    pub cl_type: JsonValue,
    pub value: JsonValue,
}

#[derive(Debug, Deserialize)]
pub struct BuildDeployRequest {
    /// Sender public key, tagged hex
    pub sender: String,
    /// Contract hash, or package hash when `package` is set
    pub target: String,
    #[serde(default)]
    pub package: bool,
    /// Package version; latest when omitted
    pub version: Option<u32>,
    pub entry_point: String,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    pub payment_motes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub hash: DeployHash,
    pub signed: bool,
    pub approvals: usize,
    pub expires_at: String,
    pub deploy: JsonValue,
}

impl From<&PendingDeploy> for DeployResponse {
    fn from(pending: &PendingDeploy) -> Self {
        match pending {
            PendingDeploy::Unsigned(deploy) => Self {
                hash: deploy.hash(),
                signed: false,
                approvals: 0,
                expires_at: format_timestamp(deploy.expires_at()),
                deploy: deploy.to_json(),
            },
            PendingDeploy::Signed(signed) => Self {
                hash: signed.hash(),
                signed: true,
                approvals: signed.approvals().len(),
                expires_at: format_timestamp(signed.deploy().expires_at()),
                deploy: signed.to_json(),
            },
        }
    }
}

/// POST /api/deploys - Build an unsigned deploy and hold it for approval
pub async fn build_deploy(
    State(state): State<AppState>,
    Json(req): Json<BuildDeployRequest>,
) -> ApiResult<Json<DeployResponse>> {
    let sender = parse_key("sender", &req.sender)?;
    let target = Address::parse(&req.target)?;
    let session = if req.package {
        Session::Package {
            hash: target,
            version: req.version,
        }
    } else {
        Session::Contract { hash: target }
    };
    let payment = match &req.payment_motes {
        Some(motes) => BigUint::parse_bytes(motes.trim().as_bytes(), 10)
            .ok_or_else(|| ApiError::BadRequest(format!("payment_motes: '{}'", motes)))?,
        None => BigUint::from(state.config.default_payment_motes),
    };

    let mut builder = DeployBuilder::new(state.config.deploy.clone())
        .account(sender)
        .session(session)
        .entry_point(req.entry_point.as_str())
        .payment(payment);
    for arg in &req.args {
        let cl_type = CLType::from_json(&arg.cl_type)?;
        builder = builder.arg(arg.name.as_str(), Arg::from_json(&cl_type, &arg.value)?);
    }
    let deploy = builder.build()?;

    tracing::info!(
        "Built deploy {} calling {} on {}",
        deploy.hash(),
        req.entry_point,
        target
    );

    let pending = PendingDeploy::Unsigned(deploy);
    let response = DeployResponse::from(&pending);
    state.deploys.insert(pending).await;
    Ok(Json(response))
}

/// GET /api/deploys/:hash - A pending deploy and its approvals
pub async fn get_deploy(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<Json<DeployResponse>> {
    let hash = parse_hash(&hash)?;
    let pending = state.deploys.get(&hash).await.ok_or_else(|| not_pending(&hash))?;
    Ok(Json(DeployResponse::from(&pending)))
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    /// Signing public key, tagged hex
    pub signer: String,
    /// Whatever the wallet returned
    pub reply: JsonValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Signed,
    Cancelled,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub hash: DeployHash,
    pub status: ApprovalStatus,
    pub approvals: usize,
}

/// POST /api/deploys/:hash/approve - Attach a wallet signature.
///
/// A failed or cancelled first approval discards the deploy; later signers of an
/// already signed deploy only add approvals.
pub async fn approve_deploy(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> ApiResult<Json<ApproveResponse>> {
    let hash = parse_hash(&hash)?;
    let signer = parse_key("signer", &req.signer)?;
    let now = now_ms();

    let pending = state.deploys.take(&hash).await.ok_or_else(|| not_pending(&hash))?;
    match pending {
        PendingDeploy::Unsigned(deploy) => {
            // the deploy is consumed: a failed or cancelled attempt means rebuilding
            match deploy.approve(&signer, &req.reply, now) {
                Ok(SignOutcome::Signed(signed)) => {
                    tracing::info!("Deploy {} signed by {}", hash, signer);
                    state.deploys.insert(PendingDeploy::Signed(signed)).await;
                    Ok(Json(ApproveResponse {
                        hash,
                        status: ApprovalStatus::Signed,
                        approvals: 1,
                    }))
                }
                Ok(SignOutcome::Cancelled) => Ok(Json(ApproveResponse {
                    hash,
                    status: ApprovalStatus::Cancelled,
                    approvals: 0,
                })),
                Err(e) => {
                    tracing::debug!("Signing of deploy {} failed: {}", hash, e);
                    Err(e.into())
                }
            }
        }
        PendingDeploy::Signed(mut signed) => {
            if signed.deploy().is_expired(now) {
                return Err(SignError::Expired {
                    expired_at_ms: signed.deploy().expires_at(),
                    now_ms: now,
                }
                .into());
            }
            if signed.approvals().iter().any(|a| a.signer == signer) {
                state.deploys.insert(PendingDeploy::Signed(signed)).await;
                return Err(ApiError::Conflict(format!(
                    "deploy {} already approved by {}",
                    hash, signer
                )));
            }

            let normalized = normalize_reply(&req.reply, &signer);
            let status = match normalized {
                Ok(Normalized::Approved(approval)) => {
                    signed.add_approval(approval);
                    tracing::info!("Deploy {} co-signed by {}", hash, signer);
                    ApprovalStatus::Signed
                }
                Ok(Normalized::Cancelled) => {
                    tracing::debug!("Co-signing of deploy {} cancelled", hash);
                    ApprovalStatus::Cancelled
                }
                Err(e) => {
                    state.deploys.insert(PendingDeploy::Signed(signed)).await;
                    return Err(e.into());
                }
            };
            let approvals = signed.approvals().len();
            state.deploys.insert(PendingDeploy::Signed(signed)).await;
            Ok(Json(ApproveResponse {
                hash,
                status,
                approvals,
            }))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    /// Block until the deploy executes or polling gives up
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub hash: DeployHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ExecutionOutcome>,
}

/// POST /api/deploys/:hash/submit - Send a signed deploy to the node
pub async fn submit_deploy(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    body: Option<Json<SubmitRequest>>,
) -> ApiResult<Json<SubmitResponse>> {
    let hash = parse_hash(&hash)?;
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let signed = match state.deploys.take(&hash).await {
        Some(PendingDeploy::Signed(signed)) => signed,
        Some(unsigned @ PendingDeploy::Unsigned(_)) => {
            state.deploys.insert(unsigned).await;
            return Err(ApiError::Conflict(format!("deploy {} is not signed", hash)));
        }
        None => return Err(not_pending(&hash)),
    };

    let now = now_ms();
    if signed.deploy().is_expired(now) {
        return Err(SignError::Expired {
            expired_at_ms: signed.deploy().expires_at(),
            now_ms: now,
        }
        .into());
    }

    if let Err(e) = submit::submit(state.transport.as_ref(), &signed).await {
        tracing::warn!("Submission of deploy {} failed: {}", hash, e);
        state.deploys.insert(PendingDeploy::Signed(signed)).await;
        return Err(e.into());
    }

    let outcome = if req.wait {
        Some(submit::await_finality(state.transport.as_ref(), hash, &state.config.poll).await?)
    } else {
        None
    };
    Ok(Json(SubmitResponse { hash, outcome }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub hash: DeployHash,
    pub pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ExecutionOutcome>,
}

/// GET /api/deploys/:hash/status - Execution result as seen by the node
pub async fn get_status(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let hash = parse_hash(&hash)?;
    let outcome =
        submit::execution_status(state.transport.as_ref(), hash, &state.config.poll.pending_codes)
            .await?;
    Ok(Json(StatusResponse {
        hash,
        pending: outcome.is_none(),
        outcome,
    }))
}
