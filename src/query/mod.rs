//! Query introspection: pure questions about a LogQL string.
//!
//! Used by the completion engine to recover the logs part of a metrics query,
//! detect parser stages and strip half-typed filters before sampling.

pub mod utils;

pub use utils::{
    format_query, get_log_query_from_metrics_query, get_parser_from_query,
    get_query_without_trailing_label_filter, get_stream_selector_positions,
    get_stream_selectors_from_query, identify_query, is_logs_query,
    is_query_pipeline_error_filtering, is_query_with_label_filter, is_query_with_label_format,
    is_query_with_line_filter, is_query_with_parser, is_valid_query, parse_to_node_names,
    remove_trailing_pipeline, ParserInfo, Position,
};
