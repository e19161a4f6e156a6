//! Line formatter that stamps a fixed prefix in front of every event.

use std::fmt::{self, Write as _};

use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{Compact, Format, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Compact event format with a leading prefix, e.g.
/// `[push] 2026-10-16T08:00:00.000000Z ERROR consumer{topic="orders"}: ...`.
pub struct PrefixedFormat {
    prefix: String,
    inner: Format<Compact>,
}

impl PrefixedFormat {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            inner: tracing_subscriber::fmt::format().compact().with_target(true),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl<S, N> FormatEvent<S, N> for PrefixedFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        writer.write_str(&self.prefix)?;
        self.inner.format_event(ctx, writer, event)
    }
}
