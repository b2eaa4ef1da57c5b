use confique::Config;

/// Configuration of the hypermedia resource engine
#[derive(Debug, Config, Clone)]
pub struct HalConfig {
    /// Maximum nesting depth of the `embed` query parameter (default: 3)
    #[config(env = "AUTHZ_ADMIN_HAL_MAX_QUERY_DEPTH", default = 3)]
    pub max_query_depth: usize,

    /// Size in bytes of the chunks a response body is streamed in (default: 1048576)
    #[config(env = "AUTHZ_ADMIN_HAL_JSON_CHUNK_SIZE", default = 1048576)]
    pub json_chunk_size: usize,

    /// Encode non-finite floats as `NaN` / `Infinity` instead of failing (default: false)
    #[config(env = "AUTHZ_ADMIN_HAL_ALLOW_NAN", default = false)]
    pub allow_nan: bool,

    /// Keep defaulted query parameters in canonical URLs instead of eliding them (default: false)
    #[config(env = "AUTHZ_ADMIN_HAL_RESTATE_DEFAULT_QUERY", default = false)]
    pub restate_default_query: bool,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            max_query_depth: hal_engine::DEFAULT_MAX_QUERY_DEPTH,
            json_chunk_size: hal_engine::json::DEFAULT_CHUNK_SIZE,
            allow_nan: false,
            restate_default_query: false,
        }
    }
}
