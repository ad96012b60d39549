//! Per-user template variable derivation and closed-form rendering.
//!
//! Each credential is produced by binding one pattern against one user: the
//! identity variables come from the account, the date variables from
//! `pwdLastSet` (people overwhelmingly rotate onto the current season or
//! year), and `extra`/`separator`/`suffix` pass through from configuration.
//! Rendering is plain substitution over the fixed vocabulary; nothing in a
//! pattern is ever evaluated as code.
use chrono::Datelike;
use deunicode::deunicode;

use crate::directory::UserRecord;
use crate::pattern::{Pattern, variables_in};

/// The registered template vocabulary. Validation rejects anything else.
pub const VARIABLES: [&str; 12] = [
    "name",
    "samaccountname",
    "year",
    "short_year",
    "month_number",
    "month_es",
    "month_en",
    "season_es",
    "season_en",
    "extra",
    "separator",
    "suffix",
];

const MONTHS_ES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

const MONTHS_EN: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

// Meteorological seasons, northern convention, indexed by month - 1.
const SEASONS_ES: [&str; 12] = [
    "Invierno",
    "Invierno",
    "Primavera",
    "Primavera",
    "Primavera",
    "Verano",
    "Verano",
    "Verano",
    "Otoño",
    "Otoño",
    "Otoño",
    "Invierno",
];

const SEASONS_EN: [&str; 12] = [
    "Winter", "Winter", "Spring", "Spring", "Spring", "Summer", "Summer", "Summer", "Autumn",
    "Autumn", "Autumn", "Winter",
];

#[derive(Debug, thiserror::Error)]
pub enum VarsError {
    /// The user cannot be bound; skip them and continue the run.
    #[error("user {user}: missing required attribute {attribute}")]
    MissingAttribute {
        user: String,
        attribute: &'static str,
    },
    /// A variable survived substitution. Unreachable after validation; if it
    /// occurs it signals a validation gap and the run must stop.
    #[error("unresolved template variable {{{name}}}")]
    UnresolvedVariable { name: String },
}

/// Ephemeral variable-to-value map for one user and one pattern invocation.
#[derive(Debug, Clone)]
pub struct VariableBinding {
    values: Vec<(&'static str, String)>,
}

impl VariableBinding {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Derive the full variable set for one user. Passwords must stay inside
/// the target charset, so the display-name token is transliterated to plain
/// ASCII. Fails only when `pwdLastSet` is absent.
pub fn bind(
    user: &UserRecord,
    extra: &str,
    separator: &str,
    suffix: &str,
) -> Result<VariableBinding, VarsError> {
    let first_token = user
        .display_name
        .split_whitespace()
        .next()
        .unwrap_or(&user.sam_account_name);
    let name = deunicode(first_token);

    let when = user
        .pwd_last_set
        .ok_or_else(|| VarsError::MissingAttribute {
            user: user.sam_account_name.clone(),
            attribute: "pwdLastSet",
        })?;
    let year = when.year();
    let month = when.month() as usize;

    Ok(VariableBinding {
        values: vec![
            ("name", name),
            ("samaccountname", user.sam_account_name.clone()),
            ("year", format!("{}", year)),
            ("short_year", format!("{:02}", year.rem_euclid(100))),
            ("month_number", format!("{:02}", month)),
            ("month_es", MONTHS_ES[month - 1].to_string()),
            ("month_en", MONTHS_EN[month - 1].to_string()),
            ("season_es", SEASONS_ES[month - 1].to_string()),
            ("season_en", SEASONS_EN[month - 1].to_string()),
            ("extra", extra.to_string()),
            ("separator", separator.to_string()),
            ("suffix", suffix.to_string()),
        ],
    })
}

/// Substitute every bound variable into `pattern`. Any `{variable}` left
/// afterwards is a hole the binding cannot fill.
pub fn render(pattern: &Pattern, binding: &VariableBinding) -> Result<String, VarsError> {
    let mut out = pattern.as_str().to_string();
    for (key, value) in &binding.values {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    if let Some(name) = variables_in(&out).into_iter().next() {
        return Err(VarsError::UnresolvedVariable { name });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn user(display_name: &str, sam: &str, pwd_last_set: Option<(i32, u32, u32)>) -> UserRecord {
        UserRecord {
            display_name: display_name.to_string(),
            sam_account_name: sam.to_string(),
            pwd_last_set: pwd_last_set
                .map(|(y, m, d)| Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()),
            when_created: None,
            bad_pwd_count: 0,
            pso: None,
        }
    }

    #[test]
    fn derives_date_variables_for_mid_july() {
        let u = user("José García", "jgarcia", Some((2023, 7, 15)));
        let b = bind(&u, "", "", "").unwrap();
        assert_eq!(b.get("year"), Some("2023"));
        assert_eq!(b.get("short_year"), Some("23"));
        assert_eq!(b.get("month_number"), Some("07"));
        assert_eq!(b.get("month_es"), Some("Julio"));
        assert_eq!(b.get("month_en"), Some("July"));
        assert_eq!(b.get("season_es"), Some("Verano"));
        assert_eq!(b.get("season_en"), Some("Summer"));
    }

    #[test]
    fn name_is_first_token_transliterated() {
        let u = user("José García", "jgarcia", Some((2023, 7, 15)));
        let b = bind(&u, "", "", "").unwrap();
        assert_eq!(b.get("name"), Some("Jose"));
        assert_eq!(b.get("samaccountname"), Some("jgarcia"));
    }

    #[test]
    fn blank_display_name_falls_back_to_logon_name() {
        let u = user("  ", "svc-backup", Some((2021, 12, 1)));
        let b = bind(&u, "", "", "").unwrap();
        assert_eq!(b.get("name"), Some("svc-backup"));
        assert_eq!(b.get("season_es"), Some("Invierno"));
        assert_eq!(b.get("season_en"), Some("Winter"));
    }

    #[test]
    fn extra_separator_suffix_pass_through() {
        let u = user("Ana", "ana", Some((2024, 3, 2)));
        let b = bind(&u, "Acme", "@", "!").unwrap();
        assert_eq!(b.get("extra"), Some("Acme"));
        assert_eq!(b.get("separator"), Some("@"));
        assert_eq!(b.get("suffix"), Some("!"));
    }

    #[test]
    fn missing_pwd_last_set_is_a_per_user_error() {
        let u = user("Bob", "bob", None);
        let err = bind(&u, "", "", "").unwrap_err();
        assert!(matches!(
            err,
            VarsError::MissingAttribute {
                attribute: "pwdLastSet",
                ..
            }
        ));
    }

    #[test]
    fn render_substitutes_every_occurrence() {
        let u = user("Ana López", "alopez", Some((2024, 10, 5)));
        let b = bind(&u, "Acme", "@", "!").unwrap();
        let p = Pattern::new("{name}{separator}{season_en}{short_year}{suffix}");
        assert_eq!(render(&p, &b).unwrap(), "Ana@Autumn24!");
    }

    #[test]
    fn render_fails_on_unresolved_variable() {
        let u = user("Ana", "ana", Some((2024, 10, 5)));
        let b = bind(&u, "", "", "").unwrap();
        let p = Pattern::new("{name}{unknown}");
        let err = render(&p, &b).unwrap_err();
        assert!(matches!(
            err,
            VarsError::UnresolvedVariable { name } if name == "unknown"
        ));
    }
}
