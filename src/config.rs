//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the path given with `--config`), then
//! applies env overrides. Secrets (`LLM_API_KEY`, `TAVILY_API_KEY`, `OAUTH_CLIENT_SECRET`) are
//! only ever sourced from the environment, never from TOML.

use std::{
    collections::BTreeMap,
    env, fmt, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

/// Which agent this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Memory-hooked agent with gateway tools, served behind the init proxy.
    Monitor,
    /// Memory-hooked agent without gateway tools.
    Websearch,
    /// Orchestrator delegating to peer agents.
    Host,
}

impl Role {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "monitor" => Ok(Role::Monitor),
            "websearch" => Ok(Role::Websearch),
            "host" => Ok(Role::Host),
            other => Err(AppError::Config(format!(
                "unknown role '{other}' (expected monitor | websearch | host)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Monitor => "monitor",
            Role::Websearch => "websearch",
            Role::Host => "host",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub role: Role,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    /// Actor used when a request carries no actor header.
    pub default_actor_id: String,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub bind: String,
    /// Externally reachable URL advertised in the agent card.
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct SessionsConfig {
    /// Drop READY sessions idle for longer than this. `None` keeps them for the process lifetime.
    pub idle_ttl_seconds: Option<u64>,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryBackend {
    /// In-process service — development and tests.
    Local,
    /// Remote JSON memory API.
    Http { endpoint: String },
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// From `MEMORY_ID`; required by the monitor and websearch roles.
    pub memory_id: Option<String>,
    pub backend: MemoryBackend,
    /// Matches injected per namespace before each turn.
    pub top_k: usize,
    /// Turn-groups replayed into the system prompt on agent init.
    pub history_turns: usize,
    pub timeout_seconds: u64,
    /// strategy type -> namespace template, used by the local backend.
    pub local_strategies: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Base URL of the workload token exchange; `{region}` is substituted.
    pub endpoint: String,
    /// Credential provider for the gateway (`GATEWAY_PROVIDER_NAME`).
    pub gateway_provider: Option<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Parameter holding the gateway URL.
    pub url_param: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct ParamsConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// `"dummy"` or `"openai"`.
    pub provider: String,
    pub openai: OpenAiConfig,
}

/// One downstream agent reachable over A2A.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub name: String,
    pub description: String,
    /// Parameter holding the peer's runtime id.
    pub runtime_id_param: String,
    /// Parameter holding the peer's credential provider name.
    pub provider_name_param: String,
}

#[derive(Debug, Clone)]
pub struct PeersConfig {
    pub region: Option<String>,
    pub account_id: Option<String>,
    /// Base URL of the runtime service; `{region}` is substituted.
    pub runtime_endpoint: String,
    pub timeout_seconds: u64,
    pub agents: Vec<PeerConfig>,
}

#[derive(Debug, Clone)]
pub struct SkillConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub examples: Vec<String>,
}

/// What this agent says about itself (agent card + system prompt).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub skills: Vec<SkillConfig>,
}

/// Web-search tool for the websearch role.
#[derive(Clone)]
pub struct WebSearchConfig {
    pub endpoint: String,
    pub top_k: usize,
    pub recency_days: Option<u32>,
    pub timeout_seconds: u64,
    /// From `TAVILY_API_KEY`; without it the role runs with no search tool.
    pub api_key: Option<String>,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_websearch_endpoint(),
            top_k: default_websearch_top_k(),
            recency_days: None,
            timeout_seconds: default_websearch_timeout(),
            api_key: None,
        }
    }
}

impl fmt::Debug for WebSearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSearchConfig")
            .field("endpoint", &self.endpoint)
            .field("top_k", &self.top_k)
            .field("recency_days", &self.recency_days)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// OAuth2 client used by the CLI. Secret never printed.
#[derive(Clone)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub http: HttpConfig,
    pub sessions: SessionsConfig,
    pub memory: MemoryConfig,
    pub identity: IdentityConfig,
    pub gateway: GatewayConfig,
    pub params: ParamsConfig,
    pub llm: LlmConfig,
    pub peers: PeersConfig,
    pub websearch: WebSearchConfig,
    pub agent: AgentConfig,
    /// From `LLM_API_KEY`; `None` for keyless local models.
    pub llm_api_key: Option<String>,
    /// From `OAUTH_CLIENT_ID` / `OAUTH_CLIENT_SECRET`.
    pub oauth_client: Option<OAuthClient>,
}

impl Config {
    /// Role-dependent startup checks. Anything missing here is fatal.
    pub fn validate(&self) -> Result<(), AppError> {
        let needs_memory = matches!(self.runtime.role, Role::Monitor | Role::Websearch);
        if needs_memory && self.memory.memory_id.as_deref().unwrap_or("").is_empty() {
            return Err(AppError::Config("missing MEMORY_ID environment variable".into()));
        }
        if self.runtime.role == Role::Monitor
            && self.identity.gateway_provider.as_deref().unwrap_or("").is_empty()
        {
            return Err(AppError::Config(
                "missing GATEWAY_PROVIDER_NAME environment variable".into(),
            ));
        }
        if self.runtime.role == Role::Host {
            if self.peers.region.is_none() {
                return Err(AppError::Config("missing AWS_REGION for host role".into()));
            }
            if self.peers.account_id.is_none() {
                return Err(AppError::Config("missing AWS_ACCOUNT_ID for host role".into()));
            }
            if self.peers.agents.is_empty() {
                return Err(AppError::Config("host role needs at least one [[peers.agents]]".into()));
            }
        }
        if self.websearch.top_k == 0 {
            return Err(AppError::Config("[websearch].top_k must be positive".into()));
        }
        if self.memory.top_k == 0 {
            return Err(AppError::Config("[memory].top_k must be positive".into()));
        }
        Ok(())
    }

    /// Region used for endpoint templates (`MCP_REGION` / `AWS_REGION`).
    pub fn region(&self) -> Option<&str> {
        self.peers.region.as_deref()
    }
}

/// Substitute `{region}` in an endpoint template.
pub fn with_region(template: &str, region: Option<&str>) -> String {
    match region {
        Some(r) => template.replace("{region}", r),
        None => template.to_string(),
    }
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    runtime: RawRuntime,
    #[serde(default)]
    http: RawHttp,
    #[serde(default)]
    sessions: RawSessions,
    #[serde(default)]
    memory: RawMemory,
    #[serde(default)]
    identity: RawIdentity,
    #[serde(default)]
    gateway: RawGateway,
    #[serde(default)]
    params: RawParams,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    peers: RawPeers,
    #[serde(default)]
    websearch: RawWebSearch,
    agent: RawAgent,
}

#[derive(Deserialize)]
struct RawRuntime {
    role: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
    #[serde(default = "default_actor_id")]
    default_actor_id: String,
}

#[derive(Deserialize)]
struct RawHttp {
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_public_url")]
    public_url: String,
}

impl Default for RawHttp {
    fn default() -> Self {
        Self { bind: default_bind(), public_url: default_public_url() }
    }
}

#[derive(Deserialize)]
struct RawSessions {
    #[serde(default)]
    idle_ttl_seconds: Option<u64>,
    #[serde(default = "default_sweep_interval")]
    sweep_interval_seconds: u64,
}

impl Default for RawSessions {
    fn default() -> Self {
        Self { idle_ttl_seconds: None, sweep_interval_seconds: default_sweep_interval() }
    }
}

#[derive(Deserialize)]
struct RawMemory {
    #[serde(default = "default_memory_backend")]
    backend: String,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_history_turns")]
    history_turns: usize,
    #[serde(default = "default_memory_timeout")]
    timeout_seconds: u64,
    #[serde(default)]
    strategies: BTreeMap<String, String>,
}

impl Default for RawMemory {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            endpoint: None,
            top_k: default_top_k(),
            history_turns: default_history_turns(),
            timeout_seconds: default_memory_timeout(),
            strategies: BTreeMap::new(),
        }
    }
}

#[derive(Deserialize)]
struct RawIdentity {
    #[serde(default = "default_agentcore_endpoint")]
    endpoint: String,
    #[serde(default = "default_identity_timeout")]
    timeout_seconds: u64,
}

impl Default for RawIdentity {
    fn default() -> Self {
        Self { endpoint: default_agentcore_endpoint(), timeout_seconds: default_identity_timeout() }
    }
}

#[derive(Deserialize)]
struct RawGateway {
    #[serde(default = "default_gateway_url_param")]
    url_param: String,
    #[serde(default = "default_gateway_timeout")]
    timeout_seconds: u64,
}

impl Default for RawGateway {
    fn default() -> Self {
        Self { url_param: default_gateway_url_param(), timeout_seconds: default_gateway_timeout() }
    }
}

#[derive(Deserialize)]
struct RawParams {
    #[serde(default = "default_params_path")]
    path: String,
}

impl Default for RawParams {
    fn default() -> Self {
        Self { path: default_params_path() }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAi,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self { provider: default_llm_provider(), openai: RawOpenAi::default() }
    }
}

#[derive(Deserialize)]
struct RawOpenAi {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_openai_temperature")]
    temperature: f32,
    #[serde(default = "default_openai_timeout")]
    timeout_seconds: u64,
}

impl Default for RawOpenAi {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_openai_temperature(),
            timeout_seconds: default_openai_timeout(),
        }
    }
}

#[derive(Deserialize)]
struct RawPeers {
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default = "default_agentcore_endpoint")]
    runtime_endpoint: String,
    #[serde(default = "default_peer_timeout")]
    timeout_seconds: u64,
    #[serde(default)]
    agents: Vec<RawPeer>,
}

impl Default for RawPeers {
    fn default() -> Self {
        Self {
            region: None,
            account_id: None,
            runtime_endpoint: default_agentcore_endpoint(),
            timeout_seconds: default_peer_timeout(),
            agents: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct RawPeer {
    name: String,
    #[serde(default)]
    description: String,
    runtime_id_param: String,
    provider_name_param: String,
}

#[derive(Deserialize)]
struct RawWebSearch {
    #[serde(default = "default_websearch_endpoint")]
    endpoint: String,
    #[serde(default = "default_websearch_top_k")]
    top_k: usize,
    #[serde(default)]
    recency_days: Option<u32>,
    #[serde(default = "default_websearch_timeout")]
    timeout_seconds: u64,
}

impl Default for RawWebSearch {
    fn default() -> Self {
        Self {
            endpoint: default_websearch_endpoint(),
            top_k: default_websearch_top_k(),
            recency_days: None,
            timeout_seconds: default_websearch_timeout(),
        }
    }
}

#[derive(Deserialize)]
struct RawAgent {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    system_prompt: String,
    #[serde(default)]
    skills: Vec<RawSkill>,
}

#[derive(Deserialize)]
struct RawSkill {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    examples: Vec<String>,
}

fn default_log_level() -> String { "info".to_string() }
fn default_actor_id() -> String { "Actor1".to_string() }
fn default_bind() -> String { "0.0.0.0:9000".to_string() }
fn default_public_url() -> String { "http://127.0.0.1:9000/".to_string() }
fn default_sweep_interval() -> u64 { 60 }
fn default_memory_backend() -> String { "local".to_string() }
fn default_top_k() -> usize { 3 }
fn default_history_turns() -> usize { 5 }
fn default_memory_timeout() -> u64 { 30 }
fn default_agentcore_endpoint() -> String { "https://bedrock-agentcore.{region}.amazonaws.com".to_string() }
fn default_identity_timeout() -> u64 { 30 }
fn default_gateway_url_param() -> String { "/monitoragent/agentcore/gateway/gateway_url".to_string() }
fn default_gateway_timeout() -> u64 { 120 }
fn default_params_path() -> String { "config/parameters.json".to_string() }
fn default_llm_provider() -> String { "dummy".to_string() }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-4o-mini".to_string() }
fn default_openai_temperature() -> f32 { 0.2 }
fn default_openai_timeout() -> u64 { 120 }
fn default_peer_timeout() -> u64 { 300 }
fn default_websearch_endpoint() -> String { "https://api.tavily.com/search".to_string() }
fn default_websearch_top_k() -> usize { 5 }
fn default_websearch_timeout() -> u64 { 30 }

// ── Loading ───────────────────────────────────────────────────────────────────

/// Env-sourced values applied on top of the TOML.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub memory_id: Option<String>,
    pub gateway_provider: Option<String>,
    pub region: Option<String>,
    pub account_id: Option<String>,
    pub model_id: Option<String>,
    pub public_url: Option<String>,
    pub bind: Option<String>,
    pub log_level: Option<String>,
    pub llm_api_key: Option<String>,
    pub tavily_api_key: Option<String>,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        let var = |k: &str| env::var(k).ok().filter(|v| !v.is_empty());
        Self {
            memory_id: var("MEMORY_ID"),
            gateway_provider: var("GATEWAY_PROVIDER_NAME"),
            region: var("MCP_REGION").or_else(|| var("AWS_REGION")),
            account_id: var("AWS_ACCOUNT_ID"),
            model_id: var("MODEL_ID"),
            public_url: var("AGENTCORE_RUNTIME_URL"),
            bind: var("A2A_BIND"),
            log_level: var("A2A_LOG_LEVEL"),
            llm_api_key: var("LLM_API_KEY"),
            tavily_api_key: var("TAVILY_API_KEY"),
            oauth_client_id: var("OAUTH_CLIENT_ID"),
            oauth_client_secret: var("OAUTH_CLIENT_SECRET"),
        }
    }
}

/// Load config from `path` (default `config/default.toml`) plus env overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let path = path.unwrap_or("config/default.toml");
    load_from(Path::new(path), &Overrides::from_env())
}

/// Loader with explicit overrides — tests pass these directly instead of mutating env vars.
pub fn load_from(path: &Path, overrides: &Overrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;
    resolve(parsed, overrides)
}

fn resolve(parsed: RawConfig, o: &Overrides) -> Result<Config, AppError> {
    let role = Role::parse(&parsed.runtime.role)?;

    let backend = match parsed.memory.backend.as_str() {
        "local" => MemoryBackend::Local,
        "http" => {
            let endpoint = parsed.memory.endpoint.clone().ok_or_else(|| {
                AppError::Config("[memory].endpoint is required for the http backend".into())
            })?;
            MemoryBackend::Http { endpoint }
        }
        other => {
            return Err(AppError::Config(format!(
                "unknown memory backend '{other}' (expected local | http)"
            )));
        }
    };

    let oauth_client = match (&o.oauth_client_id, &o.oauth_client_secret) {
        (Some(id), Some(secret)) => Some(OAuthClient {
            client_id: id.clone(),
            client_secret: secret.clone(),
        }),
        _ => None,
    };

    Ok(Config {
        runtime: RuntimeConfig {
            role,
            log_level: o.log_level.clone().unwrap_or(parsed.runtime.log_level),
            log_file: parsed.runtime.log_file.as_deref().map(expand_home),
            default_actor_id: parsed.runtime.default_actor_id,
        },
        http: HttpConfig {
            bind: o.bind.clone().unwrap_or(parsed.http.bind),
            public_url: o.public_url.clone().unwrap_or(parsed.http.public_url),
        },
        sessions: SessionsConfig {
            idle_ttl_seconds: parsed.sessions.idle_ttl_seconds,
            sweep_interval_seconds: parsed.sessions.sweep_interval_seconds.max(1),
        },
        memory: MemoryConfig {
            memory_id: o.memory_id.clone(),
            backend,
            top_k: parsed.memory.top_k,
            history_turns: parsed.memory.history_turns,
            timeout_seconds: parsed.memory.timeout_seconds,
            local_strategies: parsed.memory.strategies,
        },
        identity: IdentityConfig {
            endpoint: parsed.identity.endpoint,
            gateway_provider: o.gateway_provider.clone(),
            timeout_seconds: parsed.identity.timeout_seconds,
        },
        gateway: GatewayConfig {
            url_param: parsed.gateway.url_param,
            timeout_seconds: parsed.gateway.timeout_seconds,
        },
        params: ParamsConfig { path: expand_home(&parsed.params.path) },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                model: o.model_id.clone().unwrap_or(parsed.llm.openai.model),
                temperature: parsed.llm.openai.temperature,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
        },
        peers: PeersConfig {
            region: o.region.clone().or(parsed.peers.region),
            account_id: o.account_id.clone().or(parsed.peers.account_id),
            runtime_endpoint: parsed.peers.runtime_endpoint,
            timeout_seconds: parsed.peers.timeout_seconds,
            agents: parsed
                .peers
                .agents
                .into_iter()
                .map(|p| PeerConfig {
                    name: p.name,
                    description: p.description,
                    runtime_id_param: p.runtime_id_param,
                    provider_name_param: p.provider_name_param,
                })
                .collect(),
        },
        websearch: WebSearchConfig {
            endpoint: parsed.websearch.endpoint,
            top_k: parsed.websearch.top_k,
            recency_days: parsed.websearch.recency_days,
            timeout_seconds: parsed.websearch.timeout_seconds,
            api_key: o.tavily_api_key.clone(),
        },
        agent: AgentConfig {
            name: parsed.agent.name,
            description: parsed.agent.description,
            system_prompt: parsed.agent.system_prompt,
            skills: parsed
                .agent
                .skills
                .into_iter()
                .map(|s| SkillConfig {
                    id: s.id,
                    name: s.name,
                    description: s.description,
                    tags: s.tags,
                    examples: s.examples,
                })
                .collect(),
        },
        llm_api_key: o.llm_api_key.clone(),
        oauth_client,
    })
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

impl Config {
    /// Offline config: dummy LLM, local memory, no network endpoints.
    pub fn test_default(role: Role) -> Self {
        let mut strategies = BTreeMap::new();
        strategies.insert("SemanticMemory".to_string(), "/strategies/semantic/actors/{actorId}".to_string());
        strategies.insert("UserPreference".to_string(), "/strategies/preferences/actors/{actorId}".to_string());
        Self {
            runtime: RuntimeConfig {
                role,
                log_level: "info".into(),
                log_file: None,
                default_actor_id: "Actor1".into(),
            },
            http: HttpConfig { bind: "127.0.0.1:0".into(), public_url: "http://127.0.0.1:9000/".into() },
            sessions: SessionsConfig { idle_ttl_seconds: None, sweep_interval_seconds: 60 },
            memory: MemoryConfig {
                memory_id: Some("mem-test".into()),
                backend: MemoryBackend::Local,
                top_k: 3,
                history_turns: 5,
                timeout_seconds: 1,
                local_strategies: strategies,
            },
            identity: IdentityConfig {
                endpoint: "http://127.0.0.1:0".into(),
                gateway_provider: Some("gateway-provider".into()),
                timeout_seconds: 1,
            },
            gateway: GatewayConfig { url_param: default_gateway_url_param(), timeout_seconds: 1 },
            params: ParamsConfig { path: PathBuf::from("/nonexistent/parameters.json") },
            llm: LlmConfig {
                provider: "dummy".into(),
                openai: OpenAiConfig {
                    api_base_url: "http://127.0.0.1:0/v1/chat/completions".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    timeout_seconds: 1,
                },
            },
            peers: PeersConfig {
                region: Some("us-east-1".into()),
                account_id: Some("123456789012".into()),
                runtime_endpoint: "http://127.0.0.1:0".into(),
                timeout_seconds: 1,
                agents: Vec::new(),
            },
            websearch: WebSearchConfig { timeout_seconds: 1, ..WebSearchConfig::default() },
            agent: AgentConfig {
                name: "Test Agent".into(),
                description: "agent used in tests".into(),
                system_prompt: "You are a test agent.".into(),
                skills: Vec::new(),
            },
            llm_api_key: None,
            oauth_client: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[runtime]
role = "monitor"

[agent]
name = "Monitoring Agent"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_minimal_config() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), &Overrides::default()).unwrap();
        assert_eq!(cfg.runtime.role, Role::Monitor);
        assert_eq!(cfg.runtime.default_actor_id, "Actor1");
        assert_eq!(cfg.memory.top_k, 3);
        assert_eq!(cfg.memory.history_turns, 5);
        assert_eq!(cfg.memory.backend, MemoryBackend::Local);
        assert_eq!(cfg.http.bind, "0.0.0.0:9000");
    }

    #[test]
    fn monitor_without_memory_id_is_config_error() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), &Overrides::default()).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, AppError::Config(ref m) if m.contains("MEMORY_ID")));
    }

    #[test]
    fn monitor_without_gateway_provider_is_config_error() {
        let f = write_toml(MINIMAL_TOML);
        let overrides = Overrides { memory_id: Some("mem-1".into()), ..Default::default() };
        let cfg = load_from(f.path(), &overrides).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, AppError::Config(ref m) if m.contains("GATEWAY_PROVIDER_NAME")));
    }

    #[test]
    fn env_overrides_apply() {
        let f = write_toml(MINIMAL_TOML);
        let overrides = Overrides {
            memory_id: Some("mem-1".into()),
            gateway_provider: Some("gw".into()),
            model_id: Some("gpt-4o-2024-08-06".into()),
            public_url: Some("https://runtime.example/".into()),
            log_level: Some("debug".into()),
            ..Default::default()
        };
        let cfg = load_from(f.path(), &overrides).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.llm.openai.model, "gpt-4o-2024-08-06");
        assert_eq!(cfg.http.public_url, "https://runtime.example/");
        assert_eq!(cfg.runtime.log_level, "debug");
    }

    #[test]
    fn unknown_role_rejected() {
        let f = write_toml("[runtime]\nrole = \"janitor\"\n[agent]\nname = \"x\"\n");
        let err = load_from(f.path(), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("janitor"));
    }

    #[test]
    fn http_memory_backend_requires_endpoint() {
        let f = write_toml(
            "[runtime]\nrole = \"websearch\"\n[memory]\nbackend = \"http\"\n[agent]\nname = \"x\"\n",
        );
        assert!(load_from(f.path(), &Overrides::default()).is_err());
    }

    #[test]
    fn host_requires_peers() {
        let f = write_toml("[runtime]\nrole = \"host\"\n[agent]\nname = \"Host\"\n");
        let overrides = Overrides {
            region: Some("us-west-2".into()),
            account_id: Some("123".into()),
            ..Default::default()
        };
        let cfg = load_from(f.path(), &overrides).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn oauth_secret_is_redacted_in_debug() {
        let client = OAuthClient { client_id: "abc".into(), client_secret: "s3cret".into() };
        let shown = format!("{client:?}");
        assert!(shown.contains("abc"));
        assert!(!shown.contains("s3cret"));
    }

    #[test]
    fn websearch_section_and_key() {
        let f = write_toml(
            "[runtime]\nrole = \"websearch\"\n[websearch]\ntop_k = 8\nrecency_days = 7\n[agent]\nname = \"x\"\n",
        );
        let overrides = Overrides { tavily_api_key: Some("tvly-s3cret".into()), ..Default::default() };
        let cfg = load_from(f.path(), &overrides).unwrap();
        assert_eq!(cfg.websearch.endpoint, "https://api.tavily.com/search");
        assert_eq!(cfg.websearch.top_k, 8);
        assert_eq!(cfg.websearch.recency_days, Some(7));
        assert_eq!(cfg.websearch.api_key.as_deref(), Some("tvly-s3cret"));
        assert!(!format!("{:?}", cfg.websearch).contains("tvly-s3cret"));
    }

    #[test]
    fn region_template_substitution() {
        assert_eq!(
            with_region("https://bedrock-agentcore.{region}.amazonaws.com", Some("eu-west-1")),
            "https://bedrock-agentcore.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn missing_file_errors() {
        let err = load_from(Path::new("/nonexistent/config.toml"), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("config error"));
    }
}
