use crate::models::FieldConfig;

fn field(
    id: &str,
    name: &str,
    match_minutes: u32,
    break_minutes: u32,
    halftime_minutes: u32,
    two_halves: bool,
    categories: &[&str],
) -> FieldConfig {
    FieldConfig {
        break_minutes,
        halftime_minutes,
        two_halves,
        categories: categories.iter().map(|c| c.to_string()).collect(),
        ..FieldConfig::new(id, name, match_minutes)
    }
}

pub fn default_fields() -> Vec<FieldConfig> {
    vec![
        field("platz-1", "Platz 1", 20, 5, 5, true, &[]),
        field(
            "platz-2",
            "Platz 2",
            12,
            3,
            0,
            false,
            &[
                "C-Jugend männlich",
                "C-Jugend weiblich",
                "B-Jugend männlich",
                "B-Jugend weiblich",
            ],
        ),
        field(
            "platz-3",
            "Platz 3",
            12,
            3,
            0,
            false,
            &["D-Jugend männlich", "D-Jugend weiblich"],
        ),
        field("kleinfeld", "Kleinfeld", 10, 5, 0, false, &["E-Jugend gemischt", "Minis"]),
    ]
}
