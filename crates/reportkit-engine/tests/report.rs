use reportkit_cache::{CacheManager, GenerationCacheManager, Generations, MemoryStore};
use reportkit_engine::filtering::{FieldInput, FormField};
use reportkit_engine::{
    Column, ConfigurationError, Datasource, DatasourceOptions, Error, FilterForm, FilterSpec,
    FormOptions, GroupBy, Report, ReportOptions, Submission, Submitted, column_total,
};
use reportkit_store::{Backend, Condition, Lookup, Predicate};
use reportkit_testing::fixtures::{DEMO_USERNAMES, demo_backend, insert_simple, seed_users};
use reportkit_types::{Record, Value, resolve_value};
use std::collections::BTreeMap;
use std::sync::Arc;

fn simple_report(list_display: Option<&[&str]>) -> anyhow::Result<Report> {
    let (backend, schemas) = demo_backend()?;
    insert_simple(backend.as_ref(), &schemas, "abc", 10, 20)?;
    insert_simple(backend.as_ref(), &schemas, "def", 1, 2)?;
    Ok(Report::as_report(ReportOptions {
        datasource_options: Some(DatasourceOptions::for_schema(
            backend,
            schemas.simple.clone(),
        )),
        list_display: list_display.map(|names| names.iter().map(|n| n.to_string()).collect()),
        list_filter: vec!["char".to_string(), "integer1".to_string()],
        column_totals: vec!["integer1".to_string(), "integer2".to_string()],
        ..ReportOptions::default()
    })?)
}

fn users_report(group_by: Option<GroupBy>) -> anyhow::Result<Report> {
    let (backend, schemas) = demo_backend()?;
    seed_users(backend.as_ref(), &schemas)?;
    Ok(Report::as_report(ReportOptions {
        datasource_options: Some(
            DatasourceOptions::for_schema(backend, schemas.user.clone())
                .columns(["username", "is_staff", "first_name"]),
        ),
        group_by,
        ..ReportOptions::default()
    })?)
}

#[test]
fn test_explicit_display_order_wins() -> anyhow::Result<()> {
    let report = simple_report(Some(&["integer2", "char"]))?;

    assert_eq!(report.display_order(), ["integer2", "char"]);
    assert_eq!(report.headers(), ["Integer #2", "Character"]);

    let rows = report.rows()?;
    assert_eq!(rows[0].names().collect::<Vec<_>>(), ["integer2", "char"]);
    assert_eq!(rows[0], [Value::Int(20), Value::from("abc")][..]);

    let first = report.get(1)?.expect("second row");
    assert_eq!(first, [Value::Int(2), Value::from("def")][..]);
    assert_eq!(report.slice(0..5)?.len(), 2);
    Ok(())
}

#[test]
fn test_default_display_order_skips_system_columns() -> anyhow::Result<()> {
    let (backend, schemas) = demo_backend()?;
    let report = Report::as_report(ReportOptions {
        datasource_options: Some(
            DatasourceOptions::for_schema(backend, schemas.simple.clone()).columns([
                Column::new("id").sys_only(),
                Column::new("char"),
                Column::new("integer1"),
            ]),
        ),
        ..ReportOptions::default()
    })?;
    assert_eq!(report.display_order(), ["char", "integer1"]);
    assert_eq!(report.title(), "app.SimpleDemoModel");
    assert_eq!(format!("{:?}", report), "<Report: on `SimpleDemoModel`>");
    Ok(())
}

#[test]
fn test_unknown_display_column_is_rejected() -> anyhow::Result<()> {
    let err = simple_report(Some(&["char", "missing"])).unwrap_err();
    let err = err.downcast::<Error>()?;
    assert!(matches!(
        err,
        Error::Configuration(ConfigurationError::UnknownColumn(name)) if name == "missing"
    ));
    Ok(())
}

#[test]
fn test_groups_sorted_by_key_and_order() -> anyhow::Result<()> {
    let report = users_report(Some(GroupBy::column("is_staff", "username")))?;
    let grouper = report.grouper()?;

    assert_eq!(grouper.keys()?, [Value::Bool(false), Value::Bool(true)]);
    let usernames: Vec<Vec<String>> = grouper
        .values()?
        .iter()
        .map(|rows| {
            rows.iter()
                .map(|row| row.get("username").map(|c| c.to_string()).unwrap_or_default())
                .collect()
        })
        .collect();
    assert_eq!(
        usernames,
        [["dan", "eve", "fred"], ["alice", "bob", "carl"]]
    );
    assert_eq!(DEMO_USERNAMES.len(), 6);
    Ok(())
}

#[test]
fn test_grouper_scans_once() -> anyhow::Result<()> {
    let report = users_report(Some(GroupBy::column("is_staff", "username")))?;
    let grouper = report.grouper()?;

    let first = grouper.items()?.to_vec();
    let keys = grouper.keys()?;
    let values = grouper.values()?.len();
    assert_eq!(grouper.items()?, first.as_slice());
    assert_eq!(keys.len(), values);
    assert_eq!(grouper.scan_count(), 1);
    Ok(())
}

fn first_names_by_group(report: &Report) -> anyhow::Result<Vec<(String, Vec<String>)>> {
    Ok(report
        .get_groups()?
        .iter()
        .map(|group| {
            let names = group
                .rows
                .iter()
                .map(|row| row.get("first_name").map(|c| c.to_string()).unwrap_or_default())
                .collect();
            (group.key.to_string(), names)
        })
        .collect())
}

#[test]
fn test_cached_report_groups_like_a_fresh_one() -> anyhow::Result<()> {
    let (backend, schemas) = demo_backend()?;
    seed_users(backend.as_ref(), &schemas)?;
    let generations = Arc::new(Generations::new(Arc::new(MemoryStore::new())));
    generations.monitor(&schemas.user.id, backend.signals())?;
    let manager: Arc<dyn CacheManager> = Arc::new(GenerationCacheManager::new(generations));

    // `username` orders the groups but is not a column, so it must come
    // from the source record even on a cache hit.
    let build = |group_by: GroupBy| -> anyhow::Result<Report> {
        Ok(Report::as_report(ReportOptions {
            datasource_options: Some(
                DatasourceOptions::for_schema(backend.clone(), schemas.user.clone())
                    .columns(["first_name", "is_staff"])
                    .cached(manager.clone()),
            ),
            group_by: Some(group_by),
            ..ReportOptions::default()
        })?)
    };
    let expected = vec![
        ("False".to_string(), vec!["Dan", "Eve", "Fred"]),
        ("True".to_string(), vec!["Alice", "Bob", "Carl"]),
    ];
    let expected: Vec<(String, Vec<String>)> = expected
        .into_iter()
        .map(|(key, names)| (key, names.into_iter().map(String::from).collect()))
        .collect();

    let by_column = GroupBy::column("is_staff", "username");
    let by_callable = GroupBy::callable(
        |record: &dyn Record| resolve_value(record, "is_staff").unwrap_or_default(),
        "username",
    );
    for group_by in [by_column, by_callable] {
        let fresh = build(group_by.clone())?;
        assert_eq!(first_names_by_group(&fresh)?, expected);

        backend.reset_query_count();
        let cached = build(group_by)?;
        assert_eq!(first_names_by_group(&cached)?, expected);
        assert_eq!(backend.query_count(), 0);
    }
    Ok(())
}

#[test]
fn test_group_by_callable_and_raw_attribute() -> anyhow::Result<()> {
    let report = users_report(Some(GroupBy::callable(
        |record: &dyn Record| match resolve_value(record, "username") {
            Ok(Value::Text(name)) => Value::Int(name.len() as i64),
            _ => Value::Null,
        },
        "username",
    )))?;
    let keys: Vec<String> = report
        .get_groups()?
        .iter()
        .map(|g| g.key.to_string())
        .collect();
    assert_eq!(keys, ["3", "4", "5"]);

    // `date_joined` is not a column, so the raw record attribute is used.
    let report = users_report(Some(GroupBy::column("date_joined", "username")))?;
    assert_eq!(report.get_groups()?.len(), 6);
    Ok(())
}

#[test]
fn test_grouping_without_spec_is_configuration_error() -> anyhow::Result<()> {
    let report = users_report(None)?;
    assert!(matches!(
        report.get_groups(),
        Err(Error::Configuration(ConfigurationError::GroupingNotSet))
    ));
    Ok(())
}

#[test]
fn test_totals_and_subtotals() -> anyhow::Result<()> {
    let report = simple_report(Some(&["char", "integer1"]))?;
    assert!(report.has_subtotals());
    assert_eq!(report.summary_fields(), ["integer1"]);
    assert_eq!(
        report.totals()?,
        vec![("integer1".to_string(), Value::Int(11))]
    );

    let rows = report.rows()?;
    assert_eq!(column_total("char", &rows), Value::Int(0));
    assert_eq!(column_total("integer1", &rows[..1]), Value::Int(10));
    assert_eq!(
        report.get_column_values("integer1")?,
        [Value::Int(10), Value::Int(1)]
    );
    Ok(())
}

#[test]
fn test_filter_form_fields() -> anyhow::Result<()> {
    let report = simple_report(None)?;
    let form = FilterForm::for_report(
        &report,
        FormOptions {
            order_by: vec![("integer1".to_string(), "Integer #1".to_string())],
            group_by: vec![("boolean,char".to_string(), "Boolean".to_string())],
            configure_columns: true,
            ..FormOptions::default()
        },
    );

    assert_eq!(form.name(), "SimpleDemoModelFilterForm");
    let names: Vec<&str> = form.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "char",
            "integer1",
            "_report_order_by",
            "_report_group_by",
            "_report_list_display"
        ]
    );
    assert_eq!(
        form.field("integer1"),
        Some(&FormField::new("integer1", "Integer #1", FieldInput::Integer))
    );
    Ok(())
}

#[test]
fn test_translate_and_apply_submission() -> anyhow::Result<()> {
    let report = simple_report(None)?;
    let form = FilterForm::for_report(
        &report,
        FormOptions {
            filtering: Some(vec![
                "char".to_string(),
                "integer1".to_string(),
                "integer2".to_string(),
                "_extras_office".to_string(),
            ]),
            order_by: vec![("-integer1".to_string(), "Integer #1".to_string())],
            ..FormOptions::default()
        },
    );

    let mut keywords = BTreeMap::new();
    keywords.insert("integer1__gt".to_string(), Value::Int(5));
    let submission = Submission::new()
        .with("char", "")
        .with("integer1", Submitted::Spec(FilterSpec::Keywords(keywords)))
        .with(
            "integer2",
            Submitted::List(vec![Value::Int(2), Value::Int(20)]),
        )
        .with("_extras_office", "rome")
        .with("_report_order_by", "-integer1");

    let translated = form.translate(&submission);
    assert!(!translated.kwfilters.contains_key("char"));
    assert_eq!(translated.kwfilters.get("integer1__gt"), Some(&Value::Int(5)));
    assert!(translated.kwfilters.contains_key("integer2__in"));
    assert_eq!(
        translated.attributes.extras.get("office"),
        Some(&Value::from("rome"))
    );
    assert_eq!(
        translated.attributes.order_by,
        Some(vec!["-integer1".to_string()])
    );
    assert_eq!(translated.summary.len(), 2);

    let filtered = translated.apply(&report)?;
    let rows = filtered.rows()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("char").and_then(|c| c.value()),
        Some(&Value::from("abc"))
    );
    assert_eq!(filtered.datasource().extras().get("office"), Some(&Value::from("rome")));
    assert_eq!(filtered.filters_summary().len(), 2);

    // The original report is untouched.
    assert_eq!(report.rows()?.len(), 2);
    Ok(())
}

#[test]
fn test_condition_spec_and_unknown_report_option() -> anyhow::Result<()> {
    let report = simple_report(None)?;
    let form = FilterForm::for_report(&report, FormOptions::default())
        .with_field(FormField::new("_report_colour", "Colour", FieldInput::Text));

    let condition = Condition::Pred(Predicate::new("integer2", Lookup::Lt, Value::Int(10)));
    let translated = form.translate(
        &Submission::new()
            .with("integer1", Submitted::Spec(FilterSpec::Condition(condition)))
            .with("_report_colour", "red"),
    );
    assert_eq!(translated.filters.len(), 1);
    assert!(matches!(
        translated.apply(&report),
        Err(Error::Configuration(ConfigurationError::UnknownOption(key))) if key == "_report_colour"
    ));

    let mut clean = translated.clone();
    clean.attributes.unknown.clear();
    assert_eq!(clean.apply(&report)?.rows()?.len(), 1);
    Ok(())
}

#[test]
fn test_prototype_datasource_is_cloned() -> anyhow::Result<()> {
    let (backend, schemas) = demo_backend()?;
    insert_simple(backend.as_ref(), &schemas, "abc", 10, 20)?;
    let prototype = Datasource::as_datasource(
        DatasourceOptions::for_schema(backend.clone(), schemas.simple.clone())
            .extra("office", "milan"),
    )?;

    let mut extras = BTreeMap::new();
    extras.insert("office".to_string(), Value::from("rome"));
    let report = Report::as_report(ReportOptions {
        datasource: Some(prototype.clone_with(None)),
        extras: Some(extras),
        ..ReportOptions::default()
    })?;

    assert_eq!(report.datasource().extras().get("office"), Some(&Value::from("rome")));
    assert_eq!(prototype.extras().get("office"), Some(&Value::from("milan")));
    assert_eq!(report.rows()?.len(), 1);
    assert!(!prototype.is_materialized());
    Ok(())
}
