/*
 * Responsibility
 * - Drive the eight demo steps against the simulated servers
 * - Collect what each step would show (requests, responses, decoded JWTs)
 * - Fail loudly if any attack in step 8 is NOT rejected
 */
pub mod display;
pub mod network;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail, ensure};
use axum::http::{Method, StatusCode, header};
use chrono::Utc;
use dpop_core::access_token::decode_access_token;
use dpop_core::jws::sha256_b64url;
use dpop_core::session::Commit;
use dpop_core::settings::{AuthorizationServerMetadata, DemoSettings, METADATA_PATH};
use dpop_core::{KeyPair, KeySession, ProofRequest, build_dpop_proof, generate_key_pair};
use tokio::task::JoinHandle;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::api::oauth::dto::TokenResponse;
use crate::api::resource::dto::ProfileResponse;
use crate::api::resource::PROFILE_PATH;
use crate::config::Config;
use crate::error::ErrorResponse;

use self::display::{Section, indent, jwt_panel};
use self::network::{Exchange, Network, Outbound};

/// Result of one step-8 attack.
#[derive(Debug, Clone)]
pub struct AttackOutcome {
    pub name: &'static str,
    pub status: StatusCode,
    pub error: ErrorResponse,
}

#[derive(Debug)]
pub struct Report {
    pub sections: Vec<Section>,
    pub thumbprint: String,
    pub access_token: String,
    pub profile: ProfileResponse,
    pub attacks: Vec<AttackOutcome>,
}

struct Authorization {
    code: String,
    code_verifier: String,
}

pub struct Walkthrough {
    config: Config,
    network: Network,
    session: Arc<KeySession>,
    echo: bool,
    sections: Vec<Section>,
}

impl Walkthrough {
    pub fn new(config: Config, network: Network) -> Self {
        Self {
            config,
            network,
            session: Arc::new(KeySession::new()),
            echo: false,
            sections: Vec::new(),
        }
    }

    /// Print every section to stdout as soon as it is complete.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    fn record(&mut self, step: u8, title: &'static str, body: String) {
        info!(step, title, "walkthrough step complete");
        let section = Section { step, title, body };
        if self.echo {
            println!("{section}\n");
        }
        self.sections.push(section);
    }

    pub async fn run(mut self) -> Result<Report> {
        let key_task = self.step1_user_login();
        let (settings, key_pair) = self.step2_authorization_server(key_task).await?;
        let authorization = self.step3_authorization_code(&settings, &key_pair).await?;
        self.step4_key_generation(&key_pair);
        let token_proof = self.step5_dpop_proof(&settings, &key_pair)?;
        let access_token = self
            .step6_token_exchange(&settings, &key_pair, &authorization, &token_proof)
            .await?;
        let (profile, accepted) = self.step7_api_request(&key_pair, &access_token).await?;
        let attacks = self.step8_security_demo(&access_token, accepted).await?;

        Ok(Report {
            sections: self.sections,
            thumbprint: key_pair.thumbprint().to_string(),
            access_token,
            profile,
            attacks,
        })
    }

    fn step1_user_login(&mut self) -> JoinHandle<Result<Commit, dpop_core::KeyGenError>> {
        let algorithm = self.config.demo.algorithm;
        let session = Arc::clone(&self.session);
        // RSA generation can take a while; it runs while the user logs in.
        let task = tokio::spawn(async move { session.regenerate(algorithm).await });

        let body = format!(
            "User {} signs in to {} (client_id {}).\n\
             A {} key pair ({}) is being generated in the background.\n",
            self.config.user_email,
            self.config.redirect_uri.origin().ascii_serialization(),
            self.config.client_id,
            algorithm,
            algorithm.description(),
        );
        self.record(1, "User Login", body);
        task
    }

    async fn step2_authorization_server(
        &mut self,
        key_task: JoinHandle<Result<Commit, dpop_core::KeyGenError>>,
    ) -> Result<(DemoSettings, Arc<KeyPair>)> {
        let mut metadata_url = self.config.demo.auth_server_url.clone();
        metadata_url.set_path(METADATA_PATH);
        let discovery = Outbound::new(Method::GET, metadata_url);
        let discovery_text = display::request(&discovery);
        let exchange = self.network.send(discovery).await?;
        ensure!(exchange.status == StatusCode::OK, "metadata discovery failed: {}", exchange.status);
        let metadata: AuthorizationServerMetadata = exchange.json()?;

        let settings = self
            .config
            .demo
            .clone()
            .with_metadata(&metadata)
            .context("authorization server metadata")?;
        ensure!(
            metadata.supported_algorithms().contains(&settings.algorithm),
            "authorization server does not accept {} proofs",
            settings.algorithm
        );

        let key_pair = match key_task.await?.context("key generation")? {
            Commit::Current(versioned) => versioned.value,
            Commit::Superseded { .. } => self
                .session
                .current()
                .await
                .ok_or_else(|| anyhow!("no key pair committed"))?,
        };

        let body = format!(
            "{}\n{}\nAuthorization endpoint: {}\nToken endpoint: {}\nDPoP algorithms: {}\n",
            discovery_text,
            display::response(exchange.status, &exchange.body),
            settings.endpoints.authorization,
            settings.endpoints.token,
            metadata.dpop_signing_alg_values_supported.join(" "),
        );
        self.record(2, "Authorization Server", body);
        Ok((settings, key_pair))
    }

    async fn step3_authorization_code(
        &mut self,
        settings: &DemoSettings,
        key_pair: &KeyPair,
    ) -> Result<Authorization> {
        let state = Uuid::new_v4().simple().to_string();
        let code_verifier = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let code_challenge = sha256_b64url(code_verifier.as_bytes());

        let mut url = settings.endpoints.authorization.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &self.config.oauth_scope)
            .append_pair("state", &state)
            .append_pair("code_challenge", &code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("dpop_jkt", key_pair.thumbprint());

        let outbound = Outbound::new(Method::GET, url);
        let request_text = display::request(&outbound);
        let exchange = self.network.send(outbound).await?;
        ensure!(
            exchange.status == StatusCode::FOUND,
            "authorization request failed: {}",
            display::response(exchange.status, &exchange.body)
        );

        let location = exchange
            .header_str(header::LOCATION)
            .ok_or_else(|| anyhow!("authorization response without Location"))?;
        let callback = Url::parse(location).context("redirect Location")?;
        let param = |name: &str| {
            callback
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };
        ensure!(param("state").as_deref() == Some(state.as_str()), "state mismatch in redirect");
        let code = param("code").ok_or_else(|| anyhow!("redirect without code"))?;

        let body = format!(
            "{}\nHTTP/1.1 302 Found\nLocation: {}\n\nAuthorization code: {}\n\
             The code is bound to dpop_jkt {} and PKCE challenge {}.\n",
            request_text,
            callback,
            code,
            key_pair.thumbprint(),
            code_challenge,
        );
        self.record(3, "Authorization Code", body);
        Ok(Authorization {
            code,
            code_verifier,
        })
    }

    fn step4_key_generation(&mut self, key_pair: &KeyPair) {
        let epoch = self.session.latest_epoch();
        let body = format!(
            "Algorithm: {} ({})\nKey generation epoch: {}\nPublic JWK:\n{}\n\
             JWK thumbprint (RFC 7638, becomes cnf.jkt): {}\n",
            key_pair.algorithm(),
            key_pair.algorithm().description(),
            epoch,
            indent(&key_pair.display_public_jwk(), 2),
            key_pair.thumbprint(),
        );
        self.record(4, "Key Generation", body);
    }

    fn step5_dpop_proof(&mut self, settings: &DemoSettings, key_pair: &KeyPair) -> Result<String> {
        let proof = build_dpop_proof(
            settings.algorithm,
            key_pair,
            ProofRequest::new("POST", settings.endpoints.token.as_str(), Utc::now()),
        )
        .context("building token endpoint proof")?;

        let body = jwt_panel("DPoP proof for the token request:", &proof);
        self.record(5, "DPoP Proof Creation", body);
        Ok(proof)
    }

    async fn step6_token_exchange(
        &mut self,
        settings: &DemoSettings,
        key_pair: &KeyPair,
        authorization: &Authorization,
        proof: &str,
    ) -> Result<String> {
        let outbound = Outbound::new(Method::POST, settings.endpoints.token.clone())
            .header("dpop", proof)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", authorization.code.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("code_verifier", authorization.code_verifier.as_str()),
            ]);
        let request_text = display::request(&outbound);
        let exchange = self.network.send(outbound).await?;
        ensure!(
            exchange.status == StatusCode::OK,
            "token request failed: {}",
            display::response(exchange.status, &exchange.body)
        );
        let token: TokenResponse = exchange.json()?;
        ensure!(token.token_type == "DPoP", "expected a DPoP token, got {}", token.token_type);

        let (_, claims) = decode_access_token(&token.access_token)?;
        ensure!(
            claims.cnf.jkt == key_pair.thumbprint(),
            "access token is bound to {} instead of our key",
            claims.cnf.jkt
        );

        let body = format!(
            "{}\n{}\n{}",
            request_text,
            display::response(exchange.status, &exchange.body),
            jwt_panel("Access token (cnf.jkt = our thumbprint):", &token.access_token),
        );
        self.record(6, "Token Exchange", body);
        Ok(token.access_token)
    }

    fn profile_url(&self) -> Url {
        let mut url = self.config.api_base_url.clone();
        url.set_path(PROFILE_PATH);
        url
    }

    fn profile_request(&self, scheme: &str, access_token: &str, proof: Option<&str>) -> Outbound {
        let mut outbound = Outbound::new(Method::GET, self.profile_url())
            .header("authorization", format!("{scheme} {access_token}"));
        if let Some(proof) = proof {
            outbound = outbound.header("dpop", proof);
        }
        outbound.header("accept", "application/json")
    }

    fn api_proof(&self, key_pair: &KeyPair, access_token: &str) -> Result<String> {
        let url = self.profile_url();
        build_dpop_proof(
            key_pair.algorithm(),
            key_pair,
            ProofRequest::new("GET", url.as_str(), Utc::now()).with_access_token(access_token),
        )
        .context("building resource request proof")
    }

    async fn step7_api_request(
        &mut self,
        key_pair: &KeyPair,
        access_token: &str,
    ) -> Result<(ProfileResponse, Outbound)> {
        let proof = self.api_proof(key_pair, access_token)?;
        let outbound = self.profile_request("DPoP", access_token, Some(&proof));
        let exchange = self.network.send(outbound.clone()).await?;
        ensure!(
            exchange.status == StatusCode::OK,
            "API request failed: {}",
            display::response(exchange.status, &exchange.body)
        );
        let profile: ProfileResponse = exchange.json()?;

        let body = format!(
            "{}\n{}\n{}",
            display::request(&outbound),
            jwt_panel("DPoP proof (with ath):", &proof),
            display::response(exchange.status, &exchange.body),
        );
        self.record(7, "API Request", body);
        Ok((profile, outbound))
    }

    async fn attack(
        &self,
        name: &'static str,
        outbound: Outbound,
        expected: StatusCode,
    ) -> Result<(AttackOutcome, String)> {
        let request_text = display::request(&outbound);
        let exchange: Exchange = self.network.send(outbound).await?;
        if exchange.status.is_success() {
            bail!("attack \"{name}\" was accepted by the resource server");
        }
        ensure!(
            exchange.status == expected,
            "attack \"{name}\" rejected with {} instead of {}",
            exchange.status,
            expected
        );
        let error: ErrorResponse = exchange.json()?;
        let text = format!(
            "Attack: {name}\n{}\n{}",
            request_text,
            display::response(exchange.status, &exchange.body)
        );
        Ok((
            AttackOutcome {
                name,
                status: exchange.status,
                error,
            },
            text,
        ))
    }

    async fn step8_security_demo(
        &mut self,
        access_token: &str,
        accepted: Outbound,
    ) -> Result<Vec<AttackOutcome>> {
        let mut outcomes = Vec::new();
        let mut texts = Vec::new();

        // 1) Downgrade: the stolen token without any proof.
        let downgrade = self.profile_request("Bearer", access_token, None);
        let (outcome, text) = self
            .attack("bearer downgrade", downgrade, StatusCode::BAD_REQUEST)
            .await?;
        outcomes.push(outcome);
        texts.push(text);

        // 2) Stolen token with a proof signed by the attacker's own key.
        let attacker = generate_key_pair(self.config.demo.algorithm).await?;
        let forged_proof = self.api_proof(&attacker, access_token)?;
        let forged = self.profile_request("DPoP", access_token, Some(&forged_proof));
        let (outcome, text) = self
            .attack("forged DPoP proof", forged, StatusCode::UNAUTHORIZED)
            .await?;
        outcomes.push(outcome);
        texts.push(text);

        // 3) Replay of the request that succeeded in step 7.
        let (outcome, text) = self
            .attack("replayed DPoP proof", accepted, StatusCode::UNAUTHORIZED)
            .await?;
        outcomes.push(outcome);
        texts.push(text);

        self.record(8, "Security Demo", texts.join("\n"));
        Ok(outcomes)
    }
}
