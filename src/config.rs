//! CLI flags, environment variables, and the runtime configuration they
//! resolve into.
//!
//! Resolution is entirely `clap`'s: flags take priority over the `env`
//! equivalents declared alongside them (§6 of the design). There is no
//! config-file layer here — a bridge process is invoked per OData service,
//! so the full configuration fits on a command line.

use std::time::Duration;

use clap::Parser;

use crate::error::AppError;

/// Raw CLI/environment surface, parsed once at startup.
#[derive(Parser, Debug)]
#[command(
    name = "odata-mcp-bridge",
    about = "Bridges an OData v2/v4 service to a tool-providing MCP endpoint",
    version
)]
pub struct Args {
    /// OData service root URL (e.g. https://services.odata.org/V2/Northwind/Northwind.svc/)
    #[arg(long = "service", env = "ODATA_URL")]
    pub service: Option<String>,

    /// Service root URL given positionally instead of via --service
    #[arg(value_name = "SERVICE_URL")]
    pub service_positional: Option<String>,

    /// Basic-auth username
    #[arg(long, env = "ODATA_USER")]
    pub user: Option<String>,

    /// Basic-auth password
    #[arg(long, env = "ODATA_PASSWORD")]
    pub password: Option<String>,

    /// A `Cookie:` header value, verbatim
    #[arg(long = "cookie-string")]
    pub cookie_string: Option<String>,

    /// Path to a Netscape-format cookie file (as produced by `curl -c`)
    #[arg(long = "cookie-file", visible_alias = "cookies")]
    pub cookie_file: Option<String>,

    /// Suppress create/update/delete tools and refuse the lazy equivalents
    #[arg(long = "read-only", default_value_t = false)]
    pub read_only: bool,

    /// Force the lazy (ten generic tools) projection strategy
    #[arg(long = "lazy-metadata", env = "ODATA_LAZY_METADATA", default_value_t = false)]
    pub lazy_metadata: bool,

    /// Switch to lazy projection once the estimated eager tool count reaches
    /// this threshold. 0 disables the threshold (eager unless forced lazy).
    #[arg(long = "lazy-threshold", env = "ODATA_LAZY_THRESHOLD", default_value_t = 0)]
    pub lazy_threshold: usize,

    /// Operation filter, e.g. "r" (read-only), "rc" (read+create), "rcud".
    /// Narrows — never widens — what metadata capabilities allow.
    #[arg(short = 'o', long = "operations")]
    pub operations: Option<String>,

    /// Verbose (debug-level) logging
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    fn service_root(&self) -> Option<&str> {
        self.service
            .as_deref()
            .or(self.service_positional.as_deref())
    }
}

/// Which CRUD verbs the `-o`/`ODATA_OPERATIONS` filter admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationFilter {
    pub read: bool,
    pub create: bool,
    pub update: bool,
    pub delete: bool,
}

impl Default for OperationFilter {
    fn default() -> Self {
        Self {
            read: true,
            create: true,
            update: true,
            delete: true,
        }
    }
}

impl OperationFilter {
    fn parse(spec: &str) -> Result<Self, AppError> {
        let mut filter = Self {
            read: false,
            create: false,
            update: false,
            delete: false,
        };
        for c in spec.chars() {
            match c {
                'r' => filter.read = true,
                'c' => filter.create = true,
                'u' => filter.update = true,
                'd' => filter.delete = true,
                other => {
                    return Err(AppError::Config(format!(
                        "unrecognized operation letter '{other}' in -o/--operations (expected a subset of \"rcud\")"
                    )))
                }
            }
        }
        Ok(filter)
    }
}

/// Fully resolved configuration, immutable after startup and shared via
/// `Arc` alongside the `Schema`.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub service_root: String,
    pub read_only: bool,
    pub lazy_metadata: bool,
    pub lazy_threshold: usize,
    pub operations: OperationFilter,
    pub verbose: bool,
    pub metadata_timeout: Duration,
    pub data_timeout: Duration,
}

impl RuntimeConfig {
    pub fn from_args(args: &Args) -> Result<Self, AppError> {
        let service_root = args
            .service_root()
            .ok_or_else(|| {
                AppError::Config(
                    "missing OData service URL: pass --service <url>, a positional URL, or set ODATA_URL".to_string(),
                )
            })?
            .trim_end_matches('/')
            .to_string();

        if !(service_root.starts_with("http://") || service_root.starts_with("https://")) {
            return Err(AppError::Config(format!(
                "service URL must be http(s): {service_root}"
            )));
        }

        let mut operations = match &args.operations {
            Some(spec) => OperationFilter::parse(spec)?,
            None => OperationFilter::default(),
        };
        if args.read_only {
            // --read-only is a global override, stronger than -o/--operations:
            // it narrows to read-only regardless of what -o allowed.
            operations.create = false;
            operations.update = false;
            operations.delete = false;
        }

        Ok(Self {
            service_root,
            read_only: args.read_only,
            lazy_metadata: args.lazy_metadata,
            lazy_threshold: args.lazy_threshold,
            operations,
            verbose: args.verbose,
            metadata_timeout: Duration::from_secs(30),
            data_timeout: Duration::from_secs(60),
        })
    }
}
