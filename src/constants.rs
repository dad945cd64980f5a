//! Global constants used throughout the gadget container.
//!
//! This module contains timeout durations, retry parameters, substitution
//! tokens and other literals that are shared across modules. Defining them
//! centrally keeps the client-facing syntax in one discoverable place.

use std::time::Duration;

/// Default per-request deadline (30 seconds).
///
/// Every suspension point of a request (manifest fetch, view fetches,
/// message bundle fetch, preload fetches) observes this deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of extra attempts for the primary manifest fetch.
pub const DEFAULT_FETCH_RETRIES: u32 = 2;

/// Maximum backoff delay for exponential backoff (500ms).
///
/// Exponential backoff delays are capped at this value to prevent
/// excessive wait times during retry operations.
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Starting delay for exponential backoff (10ms).
///
/// This is the initial delay used in exponential backoff calculations,
/// which doubles on each retry attempt.
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;

/// Maximum accumulated URL-encoded length of script references in one
/// concat batch before the batch is flushed.
pub const CONCAT_BATCH_THRESHOLD: usize = 1600;

/// Default endpoint that serves rendered gadget iframes.
pub const DEFAULT_IFRAME_ENDPOINT: &str = "/gadgets/ifr";

/// Default endpoint that combines several scripts into one response.
pub const DEFAULT_CONCAT_ENDPOINT: &str = "/gadgets/concat";

/// Default endpoint that serves feature JavaScript.
pub const DEFAULT_JS_ENDPOINT: &str = "/gadgets/js";

/// Suffix of the per-feature file served under the JS endpoint.
pub const SERVED_SCRIPT_SUFFIX: &str = ".js";

/// Placeholder replaced with the module id.
pub const MODULE_ID_TOKEN: &str = "__MODULE_ID__";

/// Literal substituted for [`MODULE_ID_TOKEN`].
pub const MODULE_ID_VALUE: &str = "0";

/// Pattern matching `__UP_<name>__` user preference placeholders.
pub const USER_PREF_PATTERN: &str = r"__UP_(\w+?)__";

/// Pattern matching `__MSG_<key>__` localization placeholders.
pub const MESSAGE_PATTERN: &str = r"__MSG_(\w+?)__";

/// Name of the view used when a `Content` element has no `view` attribute.
pub const DEFAULT_VIEW: &str = "default";

/// Section of the container settings file spliced into the init script.
pub const SETTINGS_FEATURES_SECTION: &str = "gadgets.features";

/// Key under which feature parameters are merged into the init config.
pub const CORE_UTIL_SECTION: &str = "core.util";

/// Name of the gadget definition cache in the [`crate::cache::CacheRegistry`].
pub const GADGET_SPEC_CACHE: &str = "gadget-specs";

/// Name of the preload cache in the [`crate::cache::CacheRegistry`].
pub const PRELOAD_CACHE: &str = "preloads";
