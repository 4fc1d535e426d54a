use predicates::prelude::*;
use reportkit_testing::fixtures::{insert_simple, seed_users};
use reportkit_testing::{DemoSchemas, TestWorld};

const WORKSPACE: &str = r##"
[cache]
backend = "sqlite"

[[collections]]
id = "app.SimpleDemoModel"
table = "app_simpledemomodel"
fields = [
    { name = "char", kind = "char", label = "Character" },
    { name = "integer1", kind = "integer", label = "Integer #1" },
    { name = "integer2", kind = "integer", label = "Integer #2" },
    { name = "boolean", kind = "boolean", label = "Boolean" },
]

[[collections]]
id = "auth.User"
table = "auth_user"
display = "{username}"
fields = [
    { name = "username", kind = "char" },
    { name = "first_name", kind = "char" },
    { name = "last_name", kind = "char" },
    { name = "is_staff", kind = "boolean", label = "staff status" },
    { name = "date_joined", kind = "date" },
]

[[reports]]
name = "simple"
title = "Simple"
collection = "app.SimpleDemoModel"
list_display = ["char", "integer1", "integer2"]
list_filter = ["char", "integer1"]
column_totals = ["integer1"]

[[reports]]
name = "staff"
collection = "auth.User"
columns = ["username", { attr = "is_staff", widget = "yes_no" }]
"##;

fn seeded_world() -> anyhow::Result<(TestWorld, DemoSchemas)> {
    let world = TestWorld::new().with_config(WORKSPACE);
    let schemas = DemoSchemas::new();
    let backend = world.open_backend(&schemas.all())?;
    insert_simple(&backend, &schemas, "abc", 10, 20)?;
    insert_simple(&backend, &schemas, "def", 1, 2)?;
    seed_users(&backend, &schemas)?;
    Ok((world, schemas))
}

fn csv_lines(stdout: &str) -> Vec<String> {
    stdout.lines().map(|line| line.trim_end_matches('\r').to_string()).collect()
}

#[test]
fn test_list_shows_configured_reports() -> anyhow::Result<()> {
    let world = TestWorld::new().with_config(WORKSPACE);
    let result = world.run(&["list"])?;

    assert!(result.success(), "stderr: {}", result.stderr());
    assert!(predicate::str::is_match(r"simple\s+app\.SimpleDemoModel")?.eval(result.stdout()));
    assert!(predicate::str::is_match(r"staff\s+auth\.User")?.eval(result.stdout()));
    Ok(())
}

#[test]
fn test_list_without_config() -> anyhow::Result<()> {
    let world = TestWorld::new();
    let result = world.run(&["list"])?;

    assert!(result.success());
    assert!(result.stdout().contains("No reports configured"));
    Ok(())
}

#[test]
fn test_render_csv() -> anyhow::Result<()> {
    let (world, _) = seeded_world()?;
    let result = world.run(&["render", "simple", "--format", "csv"])?;

    assert!(result.success(), "stderr: {}", result.stderr());
    insta::assert_snapshot!(csv_lines(result.stdout()).join("\n"), @r"
    #,Character,Integer #1,Integer #2
    1,abc,10,20
    2,def,1,2
    ");
    Ok(())
}

#[test]
fn test_render_with_filter_and_ordering() -> anyhow::Result<()> {
    let (world, _) = seeded_world()?;

    let filtered = world.run(&["render", "simple", "--format", "csv", "--filter", "integer1=10"])?;
    assert!(filtered.success(), "stderr: {}", filtered.stderr());
    assert_eq!(csv_lines(filtered.stdout())[1..], ["1,abc,10,20"]);

    let ordered = world.run(&["render", "simple", "--format", "csv", "--order-by", "integer1"])?;
    assert!(ordered.success(), "stderr: {}", ordered.stderr());
    assert_eq!(csv_lines(ordered.stdout())[1..], ["1,def,1,2", "2,abc,10,20"]);
    Ok(())
}

#[test]
fn test_render_grouped_html() -> anyhow::Result<()> {
    let (world, _) = seeded_world()?;
    let result = world.run(&["render", "staff", "--group-by", "is_staff,username"])?;

    assert!(result.success(), "stderr: {}", result.stderr());
    let html = result.stdout();
    let no = html.find("<th colspan=\"2\">False</th>");
    let yes = html.find("<th colspan=\"2\">True</th>");
    assert!(matches!((no, yes), (Some(no), Some(yes)) if no < yes));
    assert!(html.contains(">Yes</td>"));
    Ok(())
}

#[test]
fn test_render_xlsx_to_file() -> anyhow::Result<()> {
    let (world, _) = seeded_world()?;
    let output = world.temp_dir().join("simple.xlsx");
    let result = world.run(&[
        "render",
        "simple",
        "--format",
        "xlsx",
        "--output",
        output.to_str().unwrap_or_default(),
    ])?;

    assert!(result.success(), "stderr: {}", result.stderr());
    assert!(result.stdout_bytes.is_empty());
    assert!(std::fs::read(&output)?.starts_with(b"PK"));
    Ok(())
}

#[test]
fn test_render_errors() -> anyhow::Result<()> {
    let (world, _) = seeded_world()?;

    let unknown_report = world.run(&["render", "nope"])?;
    assert!(!unknown_report.success());
    assert!(unknown_report.stderr().contains("Unknown report: nope"));

    let unknown_filter = world.run(&["render", "simple", "--filter", "colour=red"])?;
    assert!(!unknown_filter.success());
    assert!(unknown_filter.stderr().contains("Unknown filter 'colour'"));
    assert!(unknown_filter.stderr().contains("char, integer1"));

    let bad_value = world.run(&["render", "simple", "--filter", "integer1=ten"])?;
    assert!(!bad_value.success());
    assert!(bad_value.stderr().contains("Integer #1"));

    let unknown_format = world.run(&["render", "simple", "--format", "pdf"])?;
    assert!(!unknown_format.success());
    assert!(unknown_format.stderr().starts_with("Error: "));
    Ok(())
}

#[test]
fn test_cache_flush_picks_up_outside_writes() -> anyhow::Result<()> {
    let (world, schemas) = seeded_world()?;
    let rows = |world: &TestWorld| -> anyhow::Result<usize> {
        let result = world.run(&["render", "simple", "--format", "csv"])?;
        assert!(result.success(), "stderr: {}", result.stderr());
        Ok(csv_lines(result.stdout()).len() - 1)
    };
    assert_eq!(rows(&world)?, 2);

    // Writes from another process do not reach this workspace's counters.
    let backend = world.open_backend(&schemas.all())?;
    insert_simple(&backend, &schemas, "ghi", 5, 6)?;
    assert_eq!(rows(&world)?, 2);

    let flushed = world.run(&["cache", "flush"])?;
    assert!(flushed.success());
    assert!(flushed.stdout().contains("Cache flushed"));
    assert_eq!(rows(&world)?, 3);
    Ok(())
}

#[test]
fn test_cache_reset() -> anyhow::Result<()> {
    let world = TestWorld::new().with_config(WORKSPACE);

    let reset = world.run(&["cache", "reset", "auth.User"])?;
    assert!(reset.success(), "stderr: {}", reset.stderr());
    assert!(reset.stdout().contains("Generation reset for auth.User"));

    let unknown = world.run(&["cache", "reset", "auth.Nope"])?;
    assert!(!unknown.success());
    assert!(unknown.stderr().contains("Unknown collection: auth.Nope"));
    Ok(())
}
