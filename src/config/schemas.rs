/// Configuration schemas, each declared once with its defaults
///
/// Every section uses `config_struct!`, so an empty or partial TOML file
/// produces a complete `Config`.
use std::collections::HashMap;
use std::time::Duration;

// ============================================================================
// SERVER
// ============================================================================

config_struct! {
    /// Gateway HTTP/WebSocket listener
    pub struct ServerConfig {
        host: String = "0.0.0.0".to_string(),
        port: u16 = 8080,
        /// Reject WebSocket upgrades without an Authorization header
        require_auth: bool = true,
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// BACKEND RPC
// ============================================================================

config_struct! {
    /// Replica addresses for each backend service, supplied externally
    pub struct RpcConfig {
        user_endpoints: Vec<String> = vec!["127.0.0.1:50051".to_string()],
        message_endpoints: Vec<String> = vec!["127.0.0.1:50052".to_string()],
        friend_endpoints: Vec<String> = vec!["127.0.0.1:50053".to_string()],
        dial_timeout_ms: u64 = 5000,
    }
}

impl RpcConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    /// Every configured endpoint across all services, deduplicated
    pub fn all_endpoints(&self) -> Vec<String> {
        let mut all: Vec<String> = Vec::new();
        for endpoint in self
            .user_endpoints
            .iter()
            .chain(self.message_endpoints.iter())
            .chain(self.friend_endpoints.iter())
        {
            if !all.contains(endpoint) {
                all.push(endpoint.clone());
            }
        }
        all
    }
}

// ============================================================================
// LOAD MONITOR
// ============================================================================

config_struct! {
    pub struct LoadMonitorConfig {
        report_url: String = "http://127.0.0.1:8080/report_load".to_string(),
        report_interval_secs: u64 = 5,
        reporter_enabled: bool = true,
        /// Interval between full minimum-load sweeps in the selector
        forced_selection_interval_secs: u64 = 600,
    }
}

// ============================================================================
// RATE LIMIT
// ============================================================================

config_struct! {
    /// Token bucket parameters
    pub struct RateLimitConfig {
        enabled: bool = true,
        /// Tokens added per elapsed whole second
        rate: i64 = 10,
        capacity: i64 = 20,
        /// "global" or "per_ip"
        scope: String = "global".to_string(),
        key_prefix: String = "rate_limit".to_string(),
    }
}

// ============================================================================
// CIRCUIT BREAKERS
// ============================================================================

config_struct! {
    /// Settings for one named breaker
    pub struct BreakerSettings {
        timeout_ms: u64 = 2000,
        max_concurrent: usize = 100,
        error_percent_threshold: u32 = 25,
        /// Minimum calls in the window before the error rate can trip
        request_volume_threshold: u32 = 20,
        sleep_window_ms: u64 = 5000,
        rolling_window_secs: u64 = 10,
    }
}

impl BreakerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn sleep_window(&self) -> Duration {
        Duration::from_millis(self.sleep_window_ms)
    }
}

pub const RATE_LIMIT_BREAKER: &str = "rate_limit_allow";
pub const LOAD_CONFIG_BREAKER: &str = "load_config";

fn default_breaker_overrides() -> HashMap<String, BreakerSettings> {
    let mut overrides = HashMap::new();
    overrides.insert(
        RATE_LIMIT_BREAKER.to_string(),
        BreakerSettings {
            timeout_ms: 1000,
            ..BreakerSettings::default()
        },
    );
    overrides.insert(LOAD_CONFIG_BREAKER.to_string(), BreakerSettings::default());
    overrides
}

config_struct! {
    pub struct BreakersConfig {
        /// Used for any name without an override
        default: BreakerSettings = BreakerSettings::default(),
        overrides: HashMap<String, BreakerSettings> = default_breaker_overrides(),
    }
}

impl BreakersConfig {
    pub fn settings_for(&self, name: &str) -> BreakerSettings {
        self.overrides
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

// ============================================================================
// SHARED STORE
// ============================================================================

config_struct! {
    pub struct StoreConfig {
        /// e.g. "redis://127.0.0.1:6379"; in-memory store when unset
        redis_url: Option<String> = None,
    }
}

// ============================================================================
// NOTIFICATION BUS
// ============================================================================

config_struct! {
    pub struct BusConfig {
        /// Comma-joined into bootstrap.servers; in-process broker when empty
        brokers: Vec<String> = Vec::new(),
        topic: String = "im-messages".to_string(),
        group_id: String = "message-group".to_string(),
        read_retries: u32 = 3,
        retry_backoff_secs: u64 = 2,
        max_restarts: u32 = 5,
        restart_delay_secs: u64 = 5,
        /// Capacity of the in-process broker queue
        memory_capacity: usize = 1024,
    }
}

// ============================================================================
// SESSIONS
// ============================================================================

config_struct! {
    pub struct SessionConfig {
        heartbeat_interval_secs: u64 = 30,
        heartbeat_timeout_secs: u64 = 60,
        /// Per-connection outbound frame queue
        outbound_buffer: usize = 64,
        /// Per-username listener queue
        listener_buffer: usize = 32,
        reconnect_attempts: u32 = 3,
        reconnect_delay_secs: u64 = 5,
        reconnect_target: String = "ws://localhost:8080/ws".to_string(),
    }
}

impl SessionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

// ============================================================================
// IDEMPOTENCY
// ============================================================================

config_struct! {
    pub struct IdempotencyConfig {
        ttl_secs: u64 = 600,
    }
}

// ============================================================================
// ROOT
// ============================================================================

config_struct! {
    /// Root configuration
    pub struct Config {
        server: ServerConfig = ServerConfig::default(),
        rpc: RpcConfig = RpcConfig::default(),
        load_monitor: LoadMonitorConfig = LoadMonitorConfig::default(),
        rate_limit: RateLimitConfig = RateLimitConfig::default(),
        breakers: BreakersConfig = BreakersConfig::default(),
        store: StoreConfig = StoreConfig::default(),
        bus: BusConfig = BusConfig::default(),
        session: SessionConfig = SessionConfig::default(),
        idempotency: IdempotencyConfig = IdempotencyConfig::default(),
    }
}

impl Config {
    /// Reject values that would make a component misbehave at runtime
    pub fn validate(&self) -> Result<(), String> {
        if self.server.host.is_empty() {
            return Err("server.host cannot be empty".to_string());
        }
        if self.server.port == 0 {
            return Err("server.port cannot be 0".to_string());
        }
        if self.rate_limit.enabled {
            if self.rate_limit.capacity < 1 {
                return Err("rate_limit.capacity must be >= 1".to_string());
            }
            if self.rate_limit.rate < 0 {
                return Err("rate_limit.rate cannot be negative".to_string());
            }
            if !matches!(self.rate_limit.scope.as_str(), "global" | "per_ip") {
                return Err(format!(
                    "rate_limit.scope must be 'global' or 'per_ip', got '{}'",
                    self.rate_limit.scope
                ));
            }
        }
        if self.session.outbound_buffer == 0 || self.session.listener_buffer == 0 {
            return Err("session buffers must be > 0".to_string());
        }
        if self.session.heartbeat_timeout_secs <= self.session.heartbeat_interval_secs {
            return Err("session.heartbeat_timeout_secs must exceed the interval".to_string());
        }
        if self.bus.topic.is_empty() {
            return Err("bus.topic cannot be empty".to_string());
        }
        Ok(())
    }
}
