use std::fmt;

/// A request-scoped logger for one tile.
///
/// `TileLog` is obtained from [`TileScope::log`](crate::TileScope::log) and
/// borrows the request ID and tile name, so it cannot outlive the call it
/// was created for. Every event carries `request_id` and `tile` fields.
#[derive(Debug, Clone, Copy)]
pub struct TileLog<'a> {
    request_id: &'a str,
    tile: &'a str,
}

impl<'a> TileLog<'a> {
    pub(crate) fn new(request_id: &'a str, tile: &'a str) -> Self {
        Self { request_id, tile }
    }

    /// Returns the request ID associated with this logger.
    pub fn request_id(&self) -> &str {
        self.request_id
    }

    /// Returns the tile name associated with this logger.
    pub fn tile(&self) -> &str {
        self.tile
    }

    /// Logs an info-level message.
    ///
    /// Use with `format_args!`:
    /// ```no_run
    /// # use tile_core::TileLog;
    /// # fn example(log: TileLog<'_>) {
    /// log.info(format_args!("rendered {} items", 3));
    /// # }
    /// ```
    pub fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(request_id = %self.request_id, tile = %self.tile, "{}", args);
    }

    /// Logs a warning-level message.
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        tracing::warn!(request_id = %self.request_id, tile = %self.tile, "{}", args);
    }

    /// Logs an error-level message.
    pub fn error(&self, args: fmt::Arguments<'_>) {
        tracing::error!(request_id = %self.request_id, tile = %self.tile, "{}", args);
    }

    /// Logs a debug-level message.
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(request_id = %self.request_id, tile = %self.tile, "{}", args);
    }
}
