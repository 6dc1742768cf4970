//! Weapon categories known to the scraper

use std::collections::BTreeMap;

use crate::models::CategoryDescriptor;

const BUILTIN: &[(&str, &str, &str)] = &[
    ("ak", "AK-47", "ak47"),
    ("aug", "AUG", "aug"),
    ("awp", "AWP", "awp"),
    ("cz75", "CZ75-Auto", "cz75"),
    ("deagle", "Desert Eagle", "deagle"),
    ("dualies", "Dual Berettas", "elite"),
    ("famas", "FAMAS", "famas"),
    ("fiveseven", "Five-SeveN", "fiveseven"),
    ("galilar", "Galil AR", "galilar"),
    ("g3sg1", "G3SG1", "g3sg1"),
    ("glock", "Glock-18", "glock"),
    ("m249", "M249", "m249"),
    ("m4a1", "M4A1-S", "m4a1_silencer"),
    ("m4a4", "M4A4", "m4a1"),
    ("mac10", "MAC-10", "mac10"),
    ("mag7", "MAG-7", "mag7"),
    ("mp5", "MP5-SD", "mp5sd"),
    ("mp7", "MP7", "mp7"),
    ("mp9", "MP9", "mp9"),
    ("negev", "Negev", "negev"),
    ("nova", "Nova", "nova"),
    ("p250", "P250", "p250"),
    ("p90", "P90", "p90"),
    ("ppbizon", "PP-Bizon", "bizon"),
    ("revolver", "R8 Revolver", "revolver"),
    ("sawedoff", "Sawed-Off", "sawedoff"),
    ("scar20", "SCAR-20", "scar20"),
    ("scout", "SSG 08", "ssg08"),
    ("sg553", "SG 553", "sg556"),
    ("tec9", "Tec-9", "tec9"),
    ("ump45", "UMP-45", "ump45"),
    ("usp", "USP-S", "usp_silencer"),
    ("xm1014", "XM1014", "xm1014"),
];

/// Immutable key → category table, built once at startup
#[derive(Debug, Clone)]
pub struct Catalog {
    categories: BTreeMap<String, CategoryDescriptor>,
}

impl Catalog {
    pub fn builtin() -> Self {
        let categories = BUILTIN
            .iter()
            .map(|(key, name, tag)| {
                (
                    (*key).to_string(),
                    CategoryDescriptor {
                        display_name: (*name).to_string(),
                        search_tag: (*tag).to_string(),
                    },
                )
            })
            .collect();
        Self { categories }
    }

    /// Built-in table with configured entries layered on top.
    pub fn with_overrides(overrides: &BTreeMap<String, CategoryDescriptor>) -> Self {
        let mut catalog = Self::builtin();
        for (key, descriptor) in overrides {
            catalog.categories.insert(key.clone(), descriptor.clone());
        }
        catalog
    }

    pub fn get(&self, key: &str) -> Option<&CategoryDescriptor> {
        self.categories.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CategoryDescriptor)> {
        self.categories.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let catalog = Catalog::builtin();
        let m4a4 = catalog.get("m4a4").unwrap();
        assert_eq!(m4a4.display_name, "M4A4");
        assert_eq!(m4a4.search_tag, "m4a1");
        assert!(catalog.get("knife").is_none());
        assert_eq!(catalog.len(), BUILTIN.len());
    }

    #[test]
    fn test_overrides_replace_and_extend() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "ak".to_string(),
            CategoryDescriptor {
                display_name: "AK".to_string(),
                search_tag: "ak47_custom".to_string(),
            },
        );
        overrides.insert(
            "zeus".to_string(),
            CategoryDescriptor {
                display_name: "Zeus x27".to_string(),
                search_tag: "taser".to_string(),
            },
        );

        let catalog = Catalog::with_overrides(&overrides);
        assert_eq!(catalog.get("ak").unwrap().search_tag, "ak47_custom");
        assert_eq!(catalog.get("zeus").unwrap().display_name, "Zeus x27");
        assert_eq!(catalog.len(), BUILTIN.len() + 1);
    }
}
