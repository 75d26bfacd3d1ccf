//! Emoji used across console output, with plain fallbacks for dumb terminals.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[i]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
pub static PALETTE: Emoji<'_, '_> = Emoji("🎨 ", "");
pub static CAMERA: Emoji<'_, '_> = Emoji("📷 ", "");
pub static ROUND: Emoji<'_, '_> = Emoji("🔄 ", "[~]");
