mod detail;
mod packet_table;

pub use detail::detail_lines;
pub use packet_table::{RowTarget, VisibleTable};
