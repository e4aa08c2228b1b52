//! Operation ids and the catalog of operation definitions.

use super::model::ParamValue;

/// Operation ids used in [`super::model::Operation::id`].
pub mod ids {
    #![allow(missing_docs)]

    pub const JSON: &str = "json";
    pub const LOGFMT: &str = "logfmt";
    pub const REGEXP: &str = "regexp";
    pub const PATTERN: &str = "pattern";
    pub const UNPACK: &str = "unpack";
    pub const LINE_FORMAT: &str = "line_format";
    pub const LABEL_FORMAT: &str = "label_format";
    pub const DECOLORIZE: &str = "decolorize";
    pub const DROP: &str = "drop";
    pub const KEEP: &str = "keep";
    pub const UNWRAP: &str = "unwrap";

    pub const LINE_CONTAINS: &str = "__line_contains";
    pub const LINE_CONTAINS_NOT: &str = "__line_contains_not";
    pub const LINE_MATCHES_REGEX: &str = "__line_matches_regex";
    pub const LINE_MATCHES_REGEX_NOT: &str = "__line_matches_regex_not";
    pub const LINE_MATCHES_PATTERN: &str = "__line_matches_pattern";
    pub const LINE_MATCHES_PATTERN_NOT: &str = "__line_matches_pattern_not";
    pub const LINE_FILTER_IP_MATCHES: &str = "__line_filter_ip_matches";

    pub const LABEL_FILTER: &str = "__label_filter";
    pub const LABEL_FILTER_NO_ERRORS: &str = "__label_filter_no_errors";
    // the misspelling is part of the wire format
    pub const LABEL_FILTER_IP_MATCHES: &str = "__label_filter_ip_marches";
}

/// Broad grouping used when rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// `| json`, `| logfmt`, ...
    Format,
    /// `|= "x"`, `!~ "y"`, ...
    LineFilter,
    /// `| label > 5`, ...
    LabelFilter,
    /// `line_format`, `label_format`, `decolorize`, `drop`, `keep`.
    Formatter,
    /// `| unwrap x`.
    Unwrap,
    /// `rate(... [5m])`, ...
    RangeFunction,
    /// `sum(...)`, `topk(...)`, ...
    Aggregation,
    /// `... + 2`, ...
    BinaryScalar,
}

/// One declared parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamDef {
    /// Display name.
    pub name: &'static str,
    /// May be left out.
    pub optional: bool,
    /// Absorbs any number of trailing values.
    pub rest: bool,
}

const fn param(name: &'static str) -> ParamDef {
    ParamDef {
        name,
        optional: false,
        rest: false,
    }
}

const fn optional(name: &'static str) -> ParamDef {
    ParamDef {
        name,
        optional: true,
        rest: false,
    }
}

const fn rest(name: &'static str) -> ParamDef {
    ParamDef {
        name,
        optional: true,
        rest: true,
    }
}

/// Constant form of a default parameter.
#[derive(Debug, Clone, Copy)]
pub enum DefaultParam {
    #[allow(missing_docs)]
    Str(&'static str),
    #[allow(missing_docs)]
    Bool(bool),
}

/// Definition of an operation.
#[derive(Debug)]
pub struct OperationDef {
    #[allow(missing_docs)]
    pub id: &'static str,
    #[allow(missing_docs)]
    pub category: Category,
    #[allow(missing_docs)]
    pub params: &'static [ParamDef],
    defaults: &'static [DefaultParam],
}

impl OperationDef {
    /// Parameters used when the parsed ones do not fit the definition.
    pub fn default_params(&self) -> Vec<ParamValue> {
        self.defaults
            .iter()
            .map(|d| match *d {
                DefaultParam::Str(s) => ParamValue::from(s),
                DefaultParam::Bool(b) => ParamValue::Bool(b),
            })
            .collect()
    }
}

macro_rules! def {
    ($id:expr, $category:ident, [$($param:expr),*], [$($default:expr),*]) => {
        OperationDef {
            id: $id,
            category: Category::$category,
            params: &[$($param),*],
            defaults: &[$($default),*],
        }
    };
}

const RANGE: ParamDef = param("Range");

/// Every operation with a fixed id. Grouped aggregations (`__sum_by`, ...)
/// are resolved through [`aggregation_parts`] instead.
pub static OPERATION_DEFS: &[OperationDef] = &[
    def!(ids::JSON, Format, [rest("Expression")], []),
    def!(
        ids::LOGFMT,
        Format,
        [optional("Strict"), optional("Keep empty"), rest("Expression")],
        [DefaultParam::Bool(false), DefaultParam::Bool(false)]
    ),
    def!(ids::REGEXP, Format, [param("String")], [DefaultParam::Str("")]),
    def!(ids::PATTERN, Format, [param("String")], [DefaultParam::Str("")]),
    def!(ids::UNPACK, Format, [], []),
    def!(ids::LINE_CONTAINS, LineFilter, [param("String"), rest("Or")], [DefaultParam::Str("")]),
    def!(ids::LINE_CONTAINS_NOT, LineFilter, [param("String"), rest("Or")], [DefaultParam::Str("")]),
    def!(ids::LINE_MATCHES_REGEX, LineFilter, [param("Regex"), rest("Or")], [DefaultParam::Str("")]),
    def!(ids::LINE_MATCHES_REGEX_NOT, LineFilter, [param("Regex"), rest("Or")], [DefaultParam::Str("")]),
    def!(ids::LINE_MATCHES_PATTERN, LineFilter, [param("Pattern"), rest("Or")], [DefaultParam::Str("")]),
    def!(ids::LINE_MATCHES_PATTERN_NOT, LineFilter, [param("Pattern"), rest("Or")], [DefaultParam::Str("")]),
    def!(
        ids::LINE_FILTER_IP_MATCHES,
        LineFilter,
        [param("Operator"), param("Pattern")],
        [DefaultParam::Str("|="), DefaultParam::Str("")]
    ),
    def!(
        ids::LABEL_FILTER,
        LabelFilter,
        [param("Label"), param("Operator"), param("Value")],
        [DefaultParam::Str(""), DefaultParam::Str("="), DefaultParam::Str("")]
    ),
    def!(ids::LABEL_FILTER_NO_ERRORS, LabelFilter, [], []),
    def!(
        ids::LABEL_FILTER_IP_MATCHES,
        LabelFilter,
        [param("Label"), param("Operator"), param("Value")],
        [DefaultParam::Str(""), DefaultParam::Str("="), DefaultParam::Str("")]
    ),
    def!(ids::LINE_FORMAT, Formatter, [param("String")], [DefaultParam::Str("{{.}}")]),
    def!(
        ids::LABEL_FORMAT,
        Formatter,
        [param("Label"), param("Rename to")],
        [DefaultParam::Str(""), DefaultParam::Str("")]
    ),
    def!(ids::DECOLORIZE, Formatter, [], []),
    def!(ids::DROP, Formatter, [rest("Label")], []),
    def!(ids::KEEP, Formatter, [rest("Label")], []),
    def!(
        ids::UNWRAP,
        Unwrap,
        [param("Identifier"), optional("Conversion function")],
        [DefaultParam::Str(""), DefaultParam::Str("")]
    ),
    def!("rate", RangeFunction, [RANGE], [DefaultParam::Str("$__auto")]),
    def!("rate_counter", RangeFunction, [RANGE], [DefaultParam::Str("$__auto")]),
    def!("count_over_time", RangeFunction, [RANGE], [DefaultParam::Str("$__auto")]),
    def!("sum_over_time", RangeFunction, [RANGE], [DefaultParam::Str("$__auto")]),
    def!("avg_over_time", RangeFunction, [RANGE], [DefaultParam::Str("$__auto")]),
    def!("max_over_time", RangeFunction, [RANGE], [DefaultParam::Str("$__auto")]),
    def!("min_over_time", RangeFunction, [RANGE], [DefaultParam::Str("$__auto")]),
    def!("first_over_time", RangeFunction, [RANGE], [DefaultParam::Str("$__auto")]),
    def!("last_over_time", RangeFunction, [RANGE], [DefaultParam::Str("$__auto")]),
    def!("stdvar_over_time", RangeFunction, [RANGE], [DefaultParam::Str("$__auto")]),
    def!("stddev_over_time", RangeFunction, [RANGE], [DefaultParam::Str("$__auto")]),
    def!("absent_over_time", RangeFunction, [RANGE], [DefaultParam::Str("$__auto")]),
    def!("bytes_rate", RangeFunction, [RANGE], [DefaultParam::Str("$__auto")]),
    def!("bytes_over_time", RangeFunction, [RANGE], [DefaultParam::Str("$__auto")]),
    def!(
        "quantile_over_time",
        RangeFunction,
        [RANGE, param("Quantile")],
        [DefaultParam::Str("$__auto")]
    ),
    def!("sum", Aggregation, [], []),
    def!("avg", Aggregation, [], []),
    def!("min", Aggregation, [], []),
    def!("max", Aggregation, [], []),
    def!("count", Aggregation, [], []),
    def!("stddev", Aggregation, [], []),
    def!("stdvar", Aggregation, [], []),
    def!("sort", Aggregation, [], []),
    def!("sort_desc", Aggregation, [], []),
    def!("topk", Aggregation, [param("K")], []),
    def!("bottomk", Aggregation, [param("K")], []),
];

/// Binary operator that can be applied between a query and a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryScalarDef {
    /// Operator as written.
    pub sign: &'static str,
    /// Operation id.
    pub id: &'static str,
    /// Accepts a `bool` modifier.
    pub comparison: bool,
}

const fn scalar(sign: &'static str, id: &'static str, comparison: bool) -> BinaryScalarDef {
    BinaryScalarDef {
        sign,
        id,
        comparison,
    }
}

/// Arithmetic and comparison operators, keyed by sign.
pub static BINARY_SCALAR_DEFS: &[BinaryScalarDef] = &[
    scalar("+", "__addition", false),
    scalar("-", "__subtraction", false),
    scalar("*", "__multiply_by", false),
    scalar("/", "__divide_by", false),
    scalar("%", "__modulo", false),
    scalar("^", "__exponent", false),
    scalar("==", "__equal_to", true),
    scalar("!=", "__not_equal_to", true),
    scalar(">", "__greater_than", true),
    scalar("<", "__less_than", true),
    scalar(">=", "__greater_or_equal", true),
    scalar("<=", "__less_or_equal", true),
];

/// Scalar definition for an operator sign.
pub fn binary_scalar_def(sign: &str) -> Option<&'static BinaryScalarDef> {
    BINARY_SCALAR_DEFS.iter().find(|d| d.sign == sign)
}

/// Scalar definition for an operation id.
pub fn binary_scalar_def_by_id(id: &str) -> Option<&'static BinaryScalarDef> {
    BINARY_SCALAR_DEFS.iter().find(|d| d.id == id)
}

/// Definition for an operation id.
pub fn get_definition_by_id(id: &str) -> Option<&'static OperationDef> {
    OPERATION_DEFS.iter().find(|d| d.id == id)
}

/// Grouping keyword of a grouped aggregation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingKind {
    #[allow(missing_docs)]
    By,
    #[allow(missing_docs)]
    Without,
}

impl GroupingKind {
    /// Keyword as written in LogQL.
    pub fn as_str(self) -> &'static str {
        match self {
            GroupingKind::By => "by",
            GroupingKind::Without => "without",
        }
    }
}

/// Splits `__sum_by` into (`sum`, `By`).
pub fn aggregation_parts(id: &str) -> Option<(&str, GroupingKind)> {
    let inner = id.strip_prefix("__")?;
    if let Some(func) = inner.strip_suffix("_by") {
        return Some((func, GroupingKind::By));
    }
    inner
        .strip_suffix("_without")
        .map(|func| (func, GroupingKind::Without))
}

/// Category of any operation id, including grouped aggregations and scalar
/// operations.
pub fn category_of(id: &str) -> Option<Category> {
    if let Some(def) = get_definition_by_id(id) {
        return Some(def.category);
    }
    if binary_scalar_def_by_id(id).is_some() {
        return Some(Category::BinaryScalar);
    }
    aggregation_parts(id)
        .filter(|(func, _)| {
            get_definition_by_id(func).is_some_and(|d| d.category == Category::Aggregation)
        })
        .map(|_| Category::Aggregation)
}

/// True when `params` satisfies the arity of `def`.
pub fn check_params_are_valid(def: &OperationDef, params: &[ParamValue]) -> bool {
    let required = def.params.iter().filter(|p| !p.optional && !p.rest).count();
    let has_rest = def.params.iter().any(|p| p.rest);
    params.len() >= required && (has_rest || params.len() <= def.params.len())
}
