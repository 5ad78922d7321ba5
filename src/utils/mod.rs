pub mod formatting;

pub use formatting::{
    format_float, format_float_list, format_tag, format_usize_list, parse_tag, value_to_string,
};
