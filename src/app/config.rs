// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::constants::{self, BPS_DENOMINATOR, gwei_to_wei};
use crate::domain::error::AppError;
use crate::domain::types::NetworkFees;
use crate::network::ingest::mempool::FeedConfig;
use crate::network::pause_target::ReceiptWait;
use crate::services::detection::{DetectionRules, SequenceRule};
use crate::services::response::{BidderConfig, CoordinatorConfig, GasBidder, RetryPolicy};
use crate::services::sentinel::SentinelConfig;
use alloy::primitives::utils::parse_ether;
use alloy::primitives::{Address, U256};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalSettings {
    // General
    #[serde(default = "default_false")]
    pub debug: bool,
    #[serde(default = "default_false")]
    pub log_json: bool,
    /// Compute and log bids without signing or sending anything.
    #[serde(default = "default_false")]
    pub dry_run: bool,
    pub database_url: Option<String>,

    // Endpoints
    #[serde(default)]
    pub http_provider: String,
    #[serde(default)]
    pub websocket_provider: String,
    /// Detected from the HTTP endpoint when unset.
    pub chain_id: Option<u64>,

    // Identity
    #[serde(default)]
    pub wallet_key: String,
    pub contract_address: Option<Address>,

    // Detection
    /// Decimal amount of the native currency; strictly larger values are flagged.
    #[serde(default = "default_value_threshold_eth")]
    pub value_threshold_eth: String,
    /// "direct_call_burst" or "disabled".
    #[serde(default = "default_sequence_rule")]
    pub sequence_rule: String,
    #[serde(default = "default_sequence_max_direct_calls")]
    pub sequence_max_direct_calls: usize,
    #[serde(default = "default_sequence_window_capacity")]
    pub sequence_window_capacity: usize,
    #[serde(default = "default_sequence_window_secs")]
    pub sequence_window_secs: u64,

    // Response
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_panic_duration_ms")]
    pub panic_duration_ms: u64,
    #[serde(default = "default_panic_multiplier_bps")]
    pub panic_multiplier_bps: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_escalation_base_bps")]
    pub escalation_base_bps: u64,
    #[serde(default = "default_escalation_step_bps")]
    pub escalation_step_bps: u64,
    #[serde(default = "default_pause_gas_limit")]
    pub pause_gas_limit: u64,
    #[serde(default = "default_pause_gas_limit_step")]
    pub pause_gas_limit_step: u64,
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
    #[serde(default = "default_receipt_timeout_ms")]
    pub receipt_timeout_ms: u64,
    #[serde(default = "default_receipt_confirm_blocks")]
    pub receipt_confirm_blocks: u64,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    #[serde(default = "default_fallback_max_fee_gwei")]
    pub fallback_max_fee_gwei: u64,
    #[serde(default = "default_fallback_priority_fee_gwei")]
    pub fallback_priority_fee_gwei: u64,

    // Feed / pipeline
    #[serde(default = "default_feed_backoff_initial_ms")]
    pub feed_backoff_initial_ms: u64,
    #[serde(default = "default_feed_backoff_max_ms")]
    pub feed_backoff_max_ms: u64,
    #[serde(default = "default_feed_lookup_concurrency")]
    pub feed_lookup_concurrency: usize,
    #[serde(default = "default_feed_channel_capacity")]
    pub feed_channel_capacity: usize,
    #[serde(default = "default_report_channel_capacity")]
    pub report_channel_capacity: usize,
    #[serde(default = "default_pause_status_poll_secs")]
    pub pause_status_poll_secs: u64,
    #[serde(default = "default_stats_log_secs")]
    pub stats_log_secs: u64,
}

fn default_false() -> bool {
    false
}
fn default_value_threshold_eth() -> String {
    "1".to_string()
}
fn default_sequence_rule() -> String {
    "direct_call_burst".to_string()
}
fn default_sequence_max_direct_calls() -> usize {
    constants::DEFAULT_SEQUENCE_MAX_DIRECT_CALLS
}
fn default_sequence_window_capacity() -> usize {
    constants::DEFAULT_SEQUENCE_CAPACITY
}
fn default_sequence_window_secs() -> u64 {
    constants::DEFAULT_SEQUENCE_WINDOW_SECS
}
fn default_cooldown_ms() -> u64 {
    constants::DEFAULT_COOLDOWN_MS
}
fn default_panic_duration_ms() -> u64 {
    constants::DEFAULT_PANIC_DURATION_MS
}
fn default_panic_multiplier_bps() -> u64 {
    constants::DEFAULT_PANIC_MULTIPLIER_BPS
}
fn default_max_attempts() -> u32 {
    constants::DEFAULT_MAX_ATTEMPTS
}
fn default_escalation_base_bps() -> u64 {
    constants::DEFAULT_ESCALATION_BASE_BPS
}
fn default_escalation_step_bps() -> u64 {
    constants::DEFAULT_ESCALATION_STEP_BPS
}
fn default_pause_gas_limit() -> u64 {
    constants::DEFAULT_PAUSE_GAS_LIMIT
}
fn default_pause_gas_limit_step() -> u64 {
    constants::DEFAULT_PAUSE_GAS_LIMIT_STEP
}
fn default_receipt_poll_ms() -> u64 {
    500
}
fn default_receipt_timeout_ms() -> u64 {
    30_000
}
fn default_receipt_confirm_blocks() -> u64 {
    1
}
fn default_rpc_timeout_ms() -> u64 {
    5_000
}
fn default_fallback_max_fee_gwei() -> u64 {
    constants::DEFAULT_FALLBACK_MAX_FEE_GWEI
}
fn default_fallback_priority_fee_gwei() -> u64 {
    constants::DEFAULT_FALLBACK_PRIORITY_FEE_GWEI
}
fn default_feed_backoff_initial_ms() -> u64 {
    500
}
fn default_feed_backoff_max_ms() -> u64 {
    30_000
}
fn default_feed_lookup_concurrency() -> usize {
    64
}
fn default_feed_channel_capacity() -> usize {
    4_096
}
fn default_report_channel_capacity() -> usize {
    1_024
}
fn default_pause_status_poll_secs() -> u64 {
    15
}
fn default_stats_log_secs() -> u64 {
    60
}

impl GlobalSettings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(selected_path) = path {
            builder = builder.add_source(File::from(Path::new(selected_path)).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }
        // Precedence: CLI (in main) > env/.env > config file.
        builder = builder.add_source(Environment::default());

        let settings: GlobalSettings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    pub fn load() -> Result<Self, AppError> {
        Self::load_with_path(None)
    }

    /// Reject settings the sentinel cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        require_url("http_provider", &self.http_provider)?;
        require_url("websocket_provider", &self.websocket_provider)?;
        if self.wallet_key.trim().is_empty() {
            return Err(invalid("wallet_key", "WALLET_KEY is missing"));
        }
        match self.contract_address {
            None => return Err(invalid("contract_address", "CONTRACT_ADDRESS is missing")),
            Some(addr) if addr == Address::ZERO => {
                return Err(invalid("contract_address", "zero address cannot be monitored"));
            }
            Some(_) => {}
        }
        self.value_threshold_wei()?;
        self.sequence_rule_value()?;
        if self.chain_id == Some(0) {
            return Err(invalid("chain_id", "chain id 0 is not a network"));
        }
        Ok(())
    }

    pub fn log_level(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }

    pub fn monitored_contract(&self) -> Result<Address, AppError> {
        self.contract_address
            .ok_or_else(|| invalid("contract_address", "CONTRACT_ADDRESS is missing"))
    }

    pub fn value_threshold_wei(&self) -> Result<U256, AppError> {
        parse_ether(self.value_threshold_eth.trim()).map_err(|e| {
            invalid(
                "value_threshold_eth",
                &format!("'{}' is not an amount: {e}", self.value_threshold_eth),
            )
        })
    }

    pub fn sequence_rule_value(&self) -> Result<SequenceRule, AppError> {
        SequenceRule::from_name(&self.sequence_rule, self.sequence_max_direct_calls)
    }

    pub fn detection_rules(&self) -> Result<DetectionRules, AppError> {
        Ok(DetectionRules {
            monitored: self.monitored_contract()?,
            value_threshold: self.value_threshold_wei()?,
            sequence: self.sequence_rule_value()?,
        })
    }

    pub fn sequence_window_capacity_value(&self) -> usize {
        self.sequence_window_capacity.max(1)
    }

    pub fn sequence_window(&self) -> Duration {
        Duration::from_secs(self.sequence_window_secs.max(1))
    }

    pub fn max_attempts_value(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn panic_multiplier_bps_value(&self) -> u64 {
        self.panic_multiplier_bps.max(BPS_DENOMINATOR + 1)
    }

    pub fn escalation_base_bps_value(&self) -> u64 {
        self.escalation_base_bps.max(BPS_DENOMINATOR)
    }

    pub fn bidder_config(&self) -> BidderConfig {
        BidderConfig {
            escalation_base_bps: self.escalation_base_bps_value(),
            escalation_step_bps: self.escalation_step_bps,
            panic_multiplier_bps: self.panic_multiplier_bps_value(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts_value(),
            self.pause_gas_limit.max(21_000),
            self.pause_gas_limit_step,
            GasBidder::new(self.bidder_config()),
        )
    }

    pub fn receipt_poll_ms_value(&self) -> u64 {
        self.receipt_poll_ms.max(50)
    }

    pub fn receipt_timeout_ms_value(&self) -> u64 {
        self.receipt_timeout_ms.max(self.receipt_poll_ms_value())
    }

    pub fn receipt_confirm_blocks_value(&self) -> u64 {
        self.receipt_confirm_blocks.max(1)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms.max(100))
    }

    pub fn receipt_wait(&self) -> ReceiptWait {
        ReceiptWait {
            poll: Duration::from_millis(self.receipt_poll_ms_value()),
            timeout: Duration::from_millis(self.receipt_timeout_ms_value()),
            confirm_blocks: self.receipt_confirm_blocks_value(),
        }
    }

    pub fn fallback_fees(&self) -> NetworkFees {
        let max_fee = gwei_to_wei(self.fallback_max_fee_gwei.max(1));
        NetworkFees {
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: gwei_to_wei(self.fallback_priority_fee_gwei).min(max_fee),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let rpc_timeout = self.rpc_timeout();
        CoordinatorConfig {
            cooldown_ms: self.cooldown_ms,
            panic_duration_ms: self.panic_duration_ms,
            rpc_timeout,
            // Receipt wait plus the final status read.
            confirmation_timeout: Duration::from_millis(self.receipt_timeout_ms_value())
                .saturating_add(rpc_timeout),
            fallback_fees: self.fallback_fees(),
            dry_run: self.dry_run,
        }
    }

    pub fn feed_config(&self) -> FeedConfig {
        let initial = Duration::from_millis(self.feed_backoff_initial_ms.max(10));
        FeedConfig {
            backoff_initial: initial,
            backoff_max: Duration::from_millis(self.feed_backoff_max_ms).max(initial),
            lookup_concurrency: self.feed_lookup_concurrency.max(1),
            poll_interval: FeedConfig::default().poll_interval,
        }
    }

    pub fn feed_channel_capacity_value(&self) -> usize {
        self.feed_channel_capacity.max(1)
    }

    pub fn report_channel_capacity_value(&self) -> usize {
        self.report_channel_capacity.max(1)
    }

    pub fn sentinel_config(&self) -> SentinelConfig {
        SentinelConfig {
            prune_interval: SentinelConfig::default().prune_interval,
            status_poll_interval: Duration::from_secs(self.pause_status_poll_secs.max(1)),
            stats_interval: Duration::from_secs(self.stats_log_secs.max(1)),
        }
    }
}

fn invalid(field: &str, message: &str) -> AppError {
    AppError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn require_url(field: &str, value: &str) -> Result<(), AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(field, &format!("{} is missing", field.to_uppercase())));
    }
    Url::parse(trimmed)
        .map(|_| ())
        .map_err(|e| invalid(field, &format!("invalid URL: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn base_settings() -> GlobalSettings {
        GlobalSettings {
            debug: default_false(),
            log_json: default_false(),
            dry_run: default_false(),
            database_url: None,
            http_provider: "http://127.0.0.1:8545".to_string(),
            websocket_provider: "ws://127.0.0.1:8546".to_string(),
            chain_id: None,
            wallet_key: "0x0".to_string(),
            contract_address: Some(Address::repeat_byte(0x42)),
            value_threshold_eth: default_value_threshold_eth(),
            sequence_rule: default_sequence_rule(),
            sequence_max_direct_calls: default_sequence_max_direct_calls(),
            sequence_window_capacity: default_sequence_window_capacity(),
            sequence_window_secs: default_sequence_window_secs(),
            cooldown_ms: default_cooldown_ms(),
            panic_duration_ms: default_panic_duration_ms(),
            panic_multiplier_bps: default_panic_multiplier_bps(),
            max_attempts: default_max_attempts(),
            escalation_base_bps: default_escalation_base_bps(),
            escalation_step_bps: default_escalation_step_bps(),
            pause_gas_limit: default_pause_gas_limit(),
            pause_gas_limit_step: default_pause_gas_limit_step(),
            receipt_poll_ms: default_receipt_poll_ms(),
            receipt_timeout_ms: default_receipt_timeout_ms(),
            receipt_confirm_blocks: default_receipt_confirm_blocks(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            fallback_max_fee_gwei: default_fallback_max_fee_gwei(),
            fallback_priority_fee_gwei: default_fallback_priority_fee_gwei(),
            feed_backoff_initial_ms: default_feed_backoff_initial_ms(),
            feed_backoff_max_ms: default_feed_backoff_max_ms(),
            feed_lookup_concurrency: default_feed_lookup_concurrency(),
            feed_channel_capacity: default_feed_channel_capacity(),
            report_channel_capacity: default_report_channel_capacity(),
            pause_status_poll_secs: default_pause_status_poll_secs(),
            stats_log_secs: default_stats_log_secs(),
        }
    }

    #[test]
    fn defaults_validate() {
        let settings = base_settings();
        assert!(settings.validate().is_ok());
        assert_eq!(
            settings.value_threshold_wei().unwrap(),
            U256::from(1_000_000_000_000_000_000u128)
        );
        assert_eq!(settings.sequence_rule_value().unwrap(), SequenceRule::default());
    }

    #[test]
    fn missing_identity_is_rejected() {
        let mut settings = base_settings();
        settings.contract_address = None;
        assert!(matches!(
            settings.validate(),
            Err(AppError::Validation { field, .. }) if field == "contract_address"
        ));

        let mut settings = base_settings();
        settings.wallet_key = "  ".into();
        assert!(settings.validate().is_err());

        let mut settings = base_settings();
        settings.websocket_provider = "not a url".into();
        assert!(matches!(
            settings.validate(),
            Err(AppError::Validation { field, .. }) if field == "websocket_provider"
        ));
    }

    #[test]
    fn fractional_threshold_parses() {
        let mut settings = base_settings();
        settings.value_threshold_eth = "0.5".into();
        assert_eq!(
            settings.value_threshold_wei().unwrap(),
            U256::from(500_000_000_000_000_000u128)
        );
        settings.value_threshold_eth = "lots".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unsafe_values_are_clamped() {
        let mut settings = base_settings();
        settings.max_attempts = 0;
        settings.panic_multiplier_bps = 5_000;
        settings.escalation_base_bps = 1;
        settings.receipt_poll_ms = 1;
        settings.receipt_timeout_ms = 0;
        settings.receipt_confirm_blocks = 0;

        assert_eq!(settings.max_attempts_value(), 1);
        assert!(settings.panic_multiplier_bps_value() > BPS_DENOMINATOR);
        assert_eq!(settings.escalation_base_bps_value(), BPS_DENOMINATOR);
        let wait = settings.receipt_wait();
        assert_eq!(wait.poll, Duration::from_millis(50));
        assert!(wait.timeout >= wait.poll);
        assert_eq!(wait.confirm_blocks, 1);
    }

    #[test]
    fn coordinator_config_reflects_settings() {
        let mut settings = base_settings();
        settings.dry_run = true;
        settings.cooldown_ms = 250;
        let cfg = settings.coordinator_config();
        assert!(cfg.dry_run);
        assert_eq!(cfg.cooldown_ms, 250);
        assert_eq!(
            cfg.confirmation_timeout,
            Duration::from_millis(30_000 + 5_000)
        );
        assert_eq!(cfg.fallback_fees.max_fee_per_gas, gwei_to_wei(100));
    }

    #[test]
    fn disabled_sequence_rule_is_accepted() {
        let mut settings = base_settings();
        settings.sequence_rule = "disabled".into();
        assert_eq!(
            settings.detection_rules().unwrap().sequence,
            SequenceRule::Disabled
        );
    }

    #[test]
    fn loads_file_and_env_overrides() {
        let _guard = env_lock_guard();
        let dir = std::env::temp_dir().join(format!("sentinel-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            r#"
http_provider = "http://10.0.0.1:8545"
websocket_provider = "ws://10.0.0.1:8546"
wallet_key = "placeholder"
contract_address = "0x4242424242424242424242424242424242424242"
cooldown_ms = 750
"#,
        )
        .unwrap();

        unsafe { std::env::set_var("MAX_ATTEMPTS", "5") };
        let loaded = GlobalSettings::load_with_path(path.to_str());
        unsafe { std::env::remove_var("MAX_ATTEMPTS") };
        let settings = loaded.unwrap();

        assert_eq!(settings.cooldown_ms, 750);
        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.panic_duration_ms, 30_000);
        assert_eq!(settings.sequence_rule, "direct_call_burst");
        assert!(settings.validate().is_ok());
        let _ = std::fs::remove_dir_all(dir);
    }
}
