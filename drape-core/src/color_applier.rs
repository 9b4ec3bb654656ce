/// Garment base color
use log::debug;

use crate::color::Rgb;
use crate::scene::MaterialTable;

/// Set every material slot of a garment to `color`.
///
/// Returns whether any slot changed; a second call with the same color is a
/// no-op. Decal textures are separate layers and are never touched.
pub fn apply_color(materials: &mut MaterialTable, color: Rgb) -> bool {
    let mut changed = 0;
    for slot in materials.colors_mut() {
        if *slot != color {
            *slot = color;
            changed += 1;
        }
    }
    if changed > 0 {
        debug!("applied {color} to {changed} material slots");
    }
    changed > 0
}
