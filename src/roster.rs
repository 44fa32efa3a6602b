//! Side-panel entries derived from the visible roster.
//!
//! | Role        | Label         | Background                      |
//! |-------------|---------------|---------------------------------|
//! | Hunter      | name only     | none (styled by role)           |
//! | InGulag     | name + lives  | `#909090`                       |
//! | Contestant  | name + lives  | red → yellow → green by hp %    |
//!
//! A hunter who is also in the gulag keeps the hunter role but takes the
//! gulag background.

use serde::Serialize;

use crate::sync::EntityState;
use crate::types::Flag;

/// Gray used for anyone currently in the gulag.
pub const GULAG_BACKGROUND: Rgb = Rgb::new(0x90, 0x90, 0x90);

/// hp assumed when a record carries none.
const DEFAULT_HP: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Red at 0 %, yellow at 50 %, green at 100 %.  Input is clamped.
pub fn interpolate_color(percent: f64) -> Rgb {
    let p = percent.clamp(0.0, 100.0) / 100.0;
    let (r, g) = if p < 0.5 {
        (255.0, (255.0 * p * 2.0).round())
    } else {
        ((255.0 * (1.0 - (p - 0.5) * 2.0)).round(), 255.0)
    };
    Rgb::new(r as u8, g as u8, 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelRole {
    Hunter,
    InGulag,
    Contestant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelEntry {
    pub id: String,
    pub display_name: String,
    pub role: PanelRole,
    /// `"<hp> Lives"`, `"?? Lives"` when unknown, absent for hunters.
    pub hp_label: Option<String>,
    pub background: Option<Rgb>,
    pub is_damaged: bool,
}

impl PanelEntry {
    /// `None` for eliminated entities.
    pub fn from_state(state: &EntityState) -> Option<Self> {
        if state.has_flag(Flag::Eliminated) {
            return None;
        }
        let hunter = state.has_flag(Flag::Hunter);
        let gulag = state.has_flag(Flag::InGulagCurrently);

        let role = if hunter {
            PanelRole::Hunter
        } else if gulag {
            PanelRole::InGulag
        } else {
            PanelRole::Contestant
        };

        let hp_label = (!hunter).then(|| match state.hp {
            Some(hp) => format!("{} Lives", hp),
            None => "?? Lives".to_string(),
        });

        let background = if gulag {
            Some(GULAG_BACKGROUND)
        } else if hunter {
            None
        } else {
            Some(interpolate_color(state.hp.unwrap_or(DEFAULT_HP)))
        };

        Some(Self {
            id: state.id.clone(),
            display_name: state.display_name.clone(),
            role,
            hp_label,
            background,
            is_damaged: state.is_damaged,
        })
    }
}

/// Build the panel for a roster walk, preserving its order.
pub fn panel_entries<'a>(roster: impl IntoIterator<Item = &'a EntityState>) -> Vec<PanelEntry> {
    roster.into_iter().filter_map(PanelEntry::from_state).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: &str, flags: &[Flag], hp: Option<f64>) -> EntityState {
        EntityState {
            id: id.into(),
            display_name: id.to_uppercase(),
            flags: flags.iter().map(|f| f.id()).collect(),
            lat: 0.0,
            lng: 0.0,
            avatar_ref: None,
            hp,
            battery: None,
            time: None,
            last_seen_lat: 0.0,
            last_seen_lng: 0.0,
            is_damaged: false,
            damage_expires_at: None,
        }
    }

    #[test]
    fn color_scale_endpoints() {
        assert_eq!(interpolate_color(0.0), Rgb::new(255, 0, 0));
        assert_eq!(interpolate_color(50.0), Rgb::new(255, 255, 0));
        assert_eq!(interpolate_color(100.0), Rgb::new(0, 255, 0));
        assert_eq!(interpolate_color(25.0), Rgb::new(255, 128, 0));
        assert_eq!(interpolate_color(75.0), Rgb::new(128, 255, 0));
    }

    #[test]
    fn color_input_is_clamped() {
        assert_eq!(interpolate_color(-20.0), interpolate_color(0.0));
        assert_eq!(interpolate_color(400.0), interpolate_color(100.0));
        assert_eq!(Rgb::new(0, 255, 0).to_string(), "rgb(0, 255, 0)");
    }

    #[test]
    fn contestant_entry() {
        let e = PanelEntry::from_state(&state("a", &[Flag::Contestant], Some(3.0))).unwrap();
        assert_eq!(e.role, PanelRole::Contestant);
        assert_eq!(e.display_name, "A");
        assert_eq!(e.hp_label.as_deref(), Some("3 Lives"));
        assert_eq!(e.background, Some(interpolate_color(3.0)));
    }

    #[test]
    fn unknown_hp_shows_placeholder_and_full_color() {
        let e = PanelEntry::from_state(&state("a", &[], None)).unwrap();
        assert_eq!(e.hp_label.as_deref(), Some("?? Lives"));
        assert_eq!(e.background, Some(Rgb::new(0, 255, 0)));
    }

    #[test]
    fn hunter_has_no_lives_or_color() {
        let e = PanelEntry::from_state(&state("h", &[Flag::Hunter], Some(5.0))).unwrap();
        assert_eq!(e.role, PanelRole::Hunter);
        assert_eq!(e.hp_label, None);
        assert_eq!(e.background, None);
    }

    #[test]
    fn gulag_is_gray() {
        let e = PanelEntry::from_state(&state("g", &[Flag::InGulagCurrently], Some(1.0))).unwrap();
        assert_eq!(e.role, PanelRole::InGulag);
        assert_eq!(e.background, Some(GULAG_BACKGROUND));
        assert_eq!(e.hp_label.as_deref(), Some("1 Lives"));

        let hg = PanelEntry::from_state(&state("hg", &[Flag::Hunter, Flag::InGulagCurrently], None))
            .unwrap();
        assert_eq!(hg.role, PanelRole::Hunter);
        assert_eq!(hg.background, Some(GULAG_BACKGROUND));
    }

    #[test]
    fn eliminated_is_skipped_and_order_kept() {
        let states = vec![
            state("c", &[], Some(2.0)),
            state("x", &[Flag::Eliminated], Some(0.0)),
            state("a", &[Flag::Hunter], None),
        ];
        let ids: Vec<String> = panel_entries(&states).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }
}
