use reportkit_engine::{
    Column, ColumnType, DatasourceOptions, GroupBy, Renderer, Report, ReportOptions,
};
use reportkit_render::{CsvRenderer, HtmlRenderer, XlsxRenderer, standard_formats};
use reportkit_store::Backend;
use reportkit_testing::fixtures::{demo_backend, insert_simple, seed_users};
use reportkit_types::{Entity, Record, Value};
use std::sync::Arc;

fn simple_report() -> anyhow::Result<Report> {
    let (backend, schemas) = demo_backend()?;
    insert_simple(backend.as_ref(), &schemas, "abc", 10, 20)?;
    insert_simple(backend.as_ref(), &schemas, "<b>", 1, 2)?;
    Ok(Report::as_report(ReportOptions {
        title: Some("Simple".to_string()),
        datasource_options: Some(
            DatasourceOptions::for_schema(backend, schemas.simple.clone())
                .columns(["char", "integer1", "integer2", "boolean"]),
        ),
        list_display: Some(vec![
            "char".to_string(),
            "integer1".to_string(),
            "integer2".to_string(),
        ]),
        column_totals: vec!["integer1".to_string()],
        formats: standard_formats(),
        ..ReportOptions::default()
    })?)
}

#[test]
fn test_csv_output() -> anyhow::Result<()> {
    let report = simple_report()?;
    let bytes = CsvRenderer.render(&report.render_context()?)?;
    let text = String::from_utf8(bytes)?.replace("\r\n", "\n");
    insta::assert_snapshot!(text, @r"
    #,Character,Integer #1,Integer #2
    1,abc,10,20
    2,<b>,1,2
    ");
    Ok(())
}

#[test]
fn test_csv_renders_error_cells() -> anyhow::Result<()> {
    let (backend, schemas) = demo_backend()?;
    backend.insert(Entity::new(schemas.optional.clone()).with("name", "lonely"))?;
    let report = Report::as_report(ReportOptions {
        datasource_options: Some(
            DatasourceOptions::for_schema(backend, schemas.optional.clone())
                .columns(["name", "user.username"]),
        ),
        formats: standard_formats(),
        ..ReportOptions::default()
    })?;

    let text = String::from_utf8(report.render("csv")?)?;
    let line = text.lines().nth(1).unwrap_or_default();
    assert!(line.starts_with("1,lonely,"));
    assert!(line.contains("user.username"));
    Ok(())
}

#[test]
fn test_html_escapes_and_shows_totals() -> anyhow::Result<()> {
    let report = simple_report()?;
    let html = String::from_utf8(report.render("html")?)?;

    assert!(html.contains("<title>Simple</title>"));
    assert!(html.contains("<th>Integer #1</th>"));
    assert!(html.contains("&lt;b&gt;"));
    assert!(!html.contains("<td class=\"reportkit_column_char\"><b></td>"));
    assert!(html.contains("<td class=\"reportkit_column_integer\">10</td>"));
    assert!(html.contains("<tr class=\"totals\">"));
    assert!(html.contains("<td>11</td>"));
    Ok(())
}

#[test]
fn test_html_grouped_report() -> anyhow::Result<()> {
    let (backend, schemas) = demo_backend()?;
    seed_users(backend.as_ref(), &schemas)?;
    let report = Report::as_report(ReportOptions {
        datasource_options: Some(
            DatasourceOptions::for_schema(backend, schemas.user.clone())
                .columns(["username", "is_staff"]),
        ),
        group_by: Some(GroupBy::column("is_staff", "username")),
        ..ReportOptions::default()
    })?;

    let ctx = report.render_context()?;
    assert!(ctx.is_grouped());
    let html = String::from_utf8(HtmlRenderer::new().render(&ctx)?)?;

    let no = html.find("<th colspan=\"2\">False</th>").unwrap_or(usize::MAX);
    let yes = html.find("<th colspan=\"2\">True</th>").unwrap_or(usize::MAX);
    assert!(no < yes && yes < usize::MAX);
    assert!(html.contains("<td class=\"reportkit_column_boolean\">Yes</td>"));
    assert!(!html.contains("class=\"subtotals\""));
    Ok(())
}

#[test]
fn test_xlsx_is_a_zip_document() -> anyhow::Result<()> {
    let (backend, schemas) = demo_backend()?;
    seed_users(backend.as_ref(), &schemas)?;
    let report = Report::as_report(ReportOptions {
        datasource_options: Some(
            DatasourceOptions::for_schema(backend, schemas.user.clone()).columns([
                Column::new("username"),
                Column::new("date_joined"),
                Column::callable("score", |record: &dyn Record, _| {
                    Ok(Value::Decimal(record.pk().as_f64().unwrap_or_default() * 1.5))
                })
                .with_type(ColumnType::Currency),
            ]),
        ),
        formats: vec![("xlsx".to_string(), Arc::new(XlsxRenderer) as Arc<dyn Renderer>)],
        ..ReportOptions::default()
    })?;

    let bytes = report.render("xlsx")?;
    assert!(bytes.starts_with(b"PK"));
    assert_eq!(
        report.renderer_for("xlsx")?.file_extension(),
        "xlsx"
    );
    Ok(())
}

#[test]
fn test_unknown_format_is_configuration_error() -> anyhow::Result<()> {
    let report = simple_report()?;
    assert_eq!(report.format_labels(), ["html", "csv", "xlsx"]);
    assert!(matches!(
        report.render("pdf"),
        Err(reportkit_engine::Error::Configuration(
            reportkit_engine::ConfigurationError::UnknownFormat(_)
        ))
    ));
    Ok(())
}
