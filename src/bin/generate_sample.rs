use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use csv::{QuoteStyle, WriterBuilder};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.below(items.len() as u64) as usize]
    }

    /// True with probability `pct` percent.
    fn chance(&mut self, pct: u64) -> bool {
        self.below(100) < pct
    }
}

const COUNTRIES: &[(&str, &str)] = &[
    ("Germany", "Europe"),
    ("France", "Europe"),
    ("United Kingdom", "Europe"),
    ("United States", "North America"),
    ("Canada", "North America"),
    ("Japan", "Asia"),
    ("Singapore", "Asia"),
    ("Australia", "Oceania"),
    ("Brazil", "South America"),
    ("South Africa", "Africa"),
];
const TYPES: &[&str] = &[
    "Fellowship",
    "Scholarship",
    "Research Grant",
    "Postdoc Position",
    "Travel Grant",
];
const STAGES: &[&str] = &["Masters", "PhD", "Postdoc", "Early Career", "Senior Researcher"];
const FIELDS: &[&str] = &[
    "Computer Science",
    "Biology",
    "Physics",
    "Economics",
    "Public Health",
    "Climate Science",
    "Mathematics",
];
const DURATIONS: &[&str] = &[
    "6 months",
    "12 months",
    "1 year",
    "2 years",
    "3 years",
    "2 years 6 months",
    "Varies",
    "",
];
const DEADLINES: &[&str] = &[
    "2025-11-30",
    "2026-01-15",
    "2026-03-31",
    "2026-09-01",
    "2026-12-15",
    "March 1, 2027",
    "Rolling",
    "",
];

const HEADER: &[&str] = &[
    "opportunity_id",
    "program_name",
    "institution",
    "country",
    "region",
    "opportunity_type",
    "career_stage",
    "field_of_study",
    "funding_amount_min",
    "funding_amount_max",
    "funding_amount_avg",
    "duration",
    "deadline_primary",
    "application_url",
    "description",
    "eligibility_criteria",
];

fn row(rng: &mut SimpleRng, id: u32) -> Vec<String> {
    let (country, region) = COUNTRIES[rng.below(COUNTRIES.len() as u64) as usize];
    let kind = rng.pick(TYPES);
    let field = rng.pick(FIELDS);
    let (min, max, avg) = if rng.chance(15) {
        (String::new(), String::new(), String::new())
    } else {
        let min = 5_000 + rng.below(40) * 1_000;
        let max = min + rng.below(60) * 1_000;
        (min.to_string(), max.to_string(), ((min + max) / 2).to_string())
    };
    vec![
        id.to_string(),
        format!("{field} {kind} {id}"),
        format!("University of {country}"),
        country.to_string(),
        region.to_string(),
        kind.to_string(),
        rng.pick(STAGES).to_string(),
        field.to_string(),
        min,
        max,
        avg,
        rng.pick(DURATIONS).to_string(),
        rng.pick(DEADLINES).to_string(),
        format!("https://example.org/opportunities/{id}"),
        format!("Support for {} research, \"{kind}\" track.", field.to_lowercase()),
        if rng.chance(20) {
            String::new()
        } else {
            "Open to all nationalities".to_string()
        },
    ]
}

fn main() -> Result<()> {
    let out_dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| "sample_batches".into()));
    fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);
    let per_batch = 40u32;

    for batch in 1..=5u32 {
        let path = out_dir.join(format!("research_opportunities_batch{batch}.csv"));
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Necessary)
            .from_path(&path)
            .with_context(|| format!("creating {}", path.display()))?;

        // Batch 4 predates the region column.
        let keep = |col: &str| batch != 4 || col != "region";
        writer.write_record(HEADER.iter().filter(|c| keep(c)))?;

        let first = (batch - 1) * per_batch + 1;
        let mut ids: Vec<u32> = (first..first + per_batch).collect();
        // Batch 3 repeats an id from batch 2.
        if batch == 3 {
            ids[0] = per_batch + 1;
        }
        for id in ids {
            let record = row(&mut rng, id);
            writer.write_record(
                HEADER
                    .iter()
                    .zip(&record)
                    .filter(|(c, _)| keep(c))
                    .map(|(_, v)| v),
            )?;
        }
        writer.flush()?;
        println!("Wrote {per_batch} opportunities to {}", path.display());
    }

    Ok(())
}
