//! Row transplanting between tables.
//!
//! Both component lists are ascending, so the shared components are found
//! with a single merge-join walk: O(|dst| + |src|).

use crate::entity::Entity;
use crate::table::Column;

/// Copy every component `dst` and `src` share from row `src_index` into row
/// `dst_index`.
///
/// Components only in `dst` are left untouched; components only in `src`
/// are dropped. Tags (size 0) have no bytes to copy.
pub fn copy_row(
    dst_components: &[Entity],
    dst_columns: &mut [Column],
    dst_index: usize,
    src_components: &[Entity],
    src_columns: &[Column],
    src_index: usize,
) {
    debug_assert_eq!(dst_components.len(), dst_columns.len());
    debug_assert_eq!(src_components.len(), src_columns.len());

    let (mut i_dst, mut i_src) = (0, 0);
    while i_dst < dst_components.len() && i_src < src_components.len() {
        let (dst_component, src_component) = (dst_components[i_dst], src_components[i_src]);
        if dst_component == src_component {
            copy_column(
                &mut dst_columns[i_dst],
                dst_index,
                &src_columns[i_src],
                src_index,
            );
            i_dst += 1;
            i_src += 1;
        } else if dst_component < src_component {
            i_dst += 1;
        } else {
            i_src += 1;
        }
    }
}

fn copy_column(dst: &mut Column, dst_index: usize, src: &Column, src_index: usize) {
    if dst.item_size == 0 {
        return;
    }
    debug_assert_eq!(dst.item_size, src.item_size);
    if let (Some(from), Some(to)) = (src.get_raw(src_index), dst.get_raw_mut(dst_index)) {
        to.copy_from_slice(from);
    }
}
