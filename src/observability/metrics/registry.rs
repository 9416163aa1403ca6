//! Process-wide Prometheus registry.

use std::sync::LazyLock;

use prometheus::Registry;

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);
