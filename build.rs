// RustPixel
// copyright zipxing@hotmail.com 2022～2025

// Backend cfg aliases shared by the graphics core and its adapters

fn main() {
    use cfg_aliases::cfg_aliases;

    cfg_aliases! {
        // Platform aliases
        wasm: { target_arch = "wasm32" },

        // Backend aliases
        gl_backend: { all(feature = "gl", not(wasm)) },
        wgpu_backend: { feature = "wgpu" },
    }
}
