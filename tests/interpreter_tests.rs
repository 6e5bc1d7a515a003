mod common;

use chrono::NaiveDate;
use common::{TestResult, body_of, cursor, int, interpreter, provider, run, template, text};
use sqlxml::session::NativeType;
use sqlxml::{Interpreter, InterpreterConfig, MemoryProvider, ResultItem, SessionError, SqlValue, SqlXmlError};

fn names_cursor() -> ResultItem {
    ResultItem::Cursor(cursor(
        &[("name", NativeType::Varchar)],
        vec![vec![text("ann")], vec![text("bob")]],
    ))
}

// ============================================================================
// Statements and parameters
// ============================================================================

#[test]
fn test_query_with_parameter_streams_rows() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    db.respond("SELECT name FROM t WHERE id = ?", vec![names_cursor()]);

    let out = run(
        r#"<sql:execute><sql:query>SELECT name FROM t WHERE id = <sql:param type="xs:int" select="/data/id"/></sql:query><sql:result-set><sql:row-iterator><n><sql:get-column column="name"/></n></sql:row-iterator></sql:result-set></sql:execute>"#,
        "<data><id>7</id></data>",
        &mut db,
    )?;

    assert_eq!(out, "<n>ann</n><n>bob</n>");
    let executions = db.executions();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].statement, "SELECT name FROM t WHERE id =  ? ");
    assert_eq!(executions[0].parameters[0].value, int(7));
    assert_eq!(db.open_results(), 0, "results must be closed once execute ends");
    Ok(())
}

#[test]
fn test_null_parameters() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    run(
        r#"<sql:execute><sql:update>UPDATE t SET a = <sql:param type="xs:string" select="/data/name" null-if="/data/name = ''"/>, b = <sql:param type="xs:string" select="/data/missing"/>, c = <sql:param type="xs:string" value="x" null-if="true()"/></sql:update></sql:execute>"#,
        "<data><name></name></data>",
        &mut db,
    )?;

    let values: Vec<SqlValue> = db.executions()[0]
        .parameters
        .iter()
        .map(|p| p.value.clone())
        .collect();
    assert_eq!(values, vec![SqlValue::Null, SqlValue::Null, SqlValue::Null]);
    Ok(())
}

#[test]
fn test_sql_fragments_and_replaced_parameters() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    db.respond("SELECT name FROM people WHERE id IN ( ? , ? )", vec![names_cursor()]);

    let out = run(
        r#"<sql:execute><sql:query>SELECT name FROM <sql:param type="odt:literalString" select="/q/@table" replace="true"/><sql:sql> WHERE id IN (<sql:param type="xs:int" select="/q/id" separator=","/>)</sql:sql></sql:query><sql:result-set><sql:row-iterator><sql:get-column column="name"/>;</sql:row-iterator></sql:result-set></sql:execute>"#,
        r#"<q table="people"><id>1</id><id>2</id></q>"#,
        &mut db,
    )?;

    assert_eq!(out, "ann;bob;");
    let params = &db.executions()[0].parameters;
    assert_eq!(params.len(), 2);
    assert_eq!(params[1].value, int(2));
    Ok(())
}

#[test]
fn test_null_in_replaced_parameter_is_located() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    let err = run(
        r#"<sql:execute><sql:query>SELECT * FROM <sql:param type="odt:literalString" select="/none" replace="true"/></sql:query></sql:execute>"#,
        "<data/>",
        &mut db,
    )
    .unwrap_err();

    assert!(matches!(err.root(), SqlXmlError::Resolution(_)), "{}", err);
    assert!(err.location().is_some());
    assert!(db.executions().is_empty());
    Ok(())
}

#[test]
fn test_replace_rejects_other_types() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let err = run(
        r#"<sql:execute><sql:query>SELECT * FROM <sql:param type="xs:string" value="t" replace="true"/></sql:query></sql:execute>"#,
        "<data/>",
        &mut provider(),
    )
    .unwrap_err();
    assert!(matches!(err.root(), SqlXmlError::Binding(_)), "{}", err);
    Ok(())
}

#[test]
fn test_parameter_from_column_getter() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    db.respond(
        "SELECT id FROM a",
        vec![ResultItem::Cursor(cursor(
            &[("id", NativeType::Integer)],
            vec![vec![int(1)], vec![int(2)]],
        ))],
    );
    db.respond(
        "SELECT v FROM b WHERE a = ?",
        vec![ResultItem::Cursor(cursor(&[("v", NativeType::Varchar)], vec![vec![text("x")]]))],
    );

    let out = run(
        r#"<sql:execute><sql:query>SELECT id FROM a</sql:query><sql:result-set><sql:row-iterator><sql:execute><sql:query>SELECT v FROM b WHERE a = <sql:param type="xs:int"><sql:get-column column="id"/></sql:param></sql:query><sql:result-set><sql:row-iterator><p><sql:get-column column="id" ancestor="1"/>-<sql:get-column column="v"/></p></sql:row-iterator></sql:result-set></sql:execute></sql:row-iterator></sql:result-set></sql:execute>"#,
        "<data/>",
        &mut db,
    )?;

    assert_eq!(out, "<p>1-x</p><p>2-x</p>");
    let executions = db.executions();
    assert_eq!(executions.len(), 3);
    assert_eq!(executions[1].parameters[0].value, int(1));
    assert_eq!(executions[2].parameters[0].value, int(2));
    assert_eq!(db.open_results(), 0);
    Ok(())
}

#[test]
fn test_ancestor_zero_is_rejected() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    db.respond("SELECT name FROM t", vec![names_cursor()]);
    let err = run(
        r#"<sql:execute><sql:query>SELECT name FROM t</sql:query><sql:result-set><sql:row-iterator><sql:get-column column="name" ancestor="0"/></sql:row-iterator></sql:result-set></sql:execute>"#,
        "<data/>",
        &mut db,
    )
    .unwrap_err();
    assert!(matches!(err.root(), SqlXmlError::Structure(_)), "{}", err);
    assert_eq!(db.open_results(), 0);
    Ok(())
}

// ============================================================================
// Column types
// ============================================================================

fn typed_row() -> ResultItem {
    let date = NaiveDate::from_ymd_opt(2024, 1, 2).expect("valid date");
    let stamp = date.and_hms_opt(3, 4, 5).expect("valid time");
    ResultItem::Cursor(cursor(
        &[
            ("n", NativeType::Integer),
            ("s", NativeType::Varchar),
            ("d", NativeType::Date),
            ("t", NativeType::Timestamp),
            ("f", NativeType::Double),
            ("bin", NativeType::Blob),
            ("flag", NativeType::Boolean),
            ("missing", NativeType::Varchar),
        ],
        vec![vec![
            int(5),
            text("<b>x</b>"),
            SqlValue::Date(date),
            SqlValue::Timestamp(stamp),
            SqlValue::Double(1.5),
            SqlValue::Blob(vec![1, 2, 3]),
            SqlValue::Boolean(true),
            SqlValue::Null,
        ]],
    ))
}

fn run_row(row_body: &str) -> Result<String, SqlXmlError> {
    let mut db = provider();
    db.respond("SELECT * FROM typed", vec![typed_row()]);
    run(
        &format!(
            "<sql:execute><sql:query>SELECT * FROM typed</sql:query><sql:result-set><sql:row-iterator>{}</sql:row-iterator></sql:result-set></sql:execute>",
            row_body
        ),
        "<data/>",
        &mut db,
    )
}

#[test]
fn test_values_are_written_in_their_default_type() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let out = run_row(
        r#"<n><sql:get-column column="n"/></n><d><sql:get-column column="d"/></d><t><sql:get-column column="t"/></t><f><sql:get-column column="f"/></f><bin><sql:get-column column="bin"/></bin><flag><sql:get-column column="flag"/></flag><m><sql:get-column column="missing"/></m>"#,
    )?;
    assert_eq!(
        out,
        "<n>5</n><d>2024-01-02</d><t>2024-01-02T03:04:05</t><f>1.5</f><bin>AQID</bin><flag>true</flag><m></m>"
    );
    Ok(())
}

#[test]
fn test_text_column_read_as_xml_fragment() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let out = run_row(r#"<sql:get-column column="s" type="odt:xmlFragment"/>|<sql:get-column column="s"/>"#)?;
    assert_eq!(out, "<b>x</b>|&lt;b&gt;x&lt;/b&gt;");
    Ok(())
}

#[test]
fn test_requested_type_must_match_column() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let err = run_row(r#"<sql:get-column column="n" type="xs:string"/>"#).unwrap_err();
    assert!(matches!(err.root(), SqlXmlError::Resolution(_)), "{}", err);
    assert!(err.to_string().contains("INTEGER"), "{}", err);
    Ok(())
}

#[test]
fn test_legacy_getters_convert() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let out = run_row(r#"<sql:get-string column="n"/>/<sql:get-int column-index="1"/>"#)?;
    assert_eq!(out, "5/5");
    Ok(())
}

#[test]
fn test_column_metadata() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let out = run_row(
        r#"<sql:get-column-name column-index="2"/>,<sql:get-column-index column="D"/>,<sql:get-column-type column="t"/>"#,
    )?;
    assert_eq!(out, "s,3,TIMESTAMP");
    Ok(())
}

#[test]
fn test_unknown_column_is_located() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let err = run_row(r#"<sql:get-column column="nope"/>"#).unwrap_err();
    assert!(matches!(err.root(), SqlXmlError::Resolution(_)), "{}", err);
    let location = err.location().expect("error carries a location");
    assert_eq!(location.line, 1);
    assert_eq!(&*location.system_id, "template");
    Ok(())
}

#[test]
fn test_column_iterator_walks_columns() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    db.respond(
        "SELECT a, b FROM t",
        vec![ResultItem::Cursor(cursor(
            &[("a", NativeType::Integer), ("b", NativeType::Varchar)],
            vec![vec![int(1), text("one")]],
        ))],
    );
    let out = run(
        r#"<sql:execute><sql:query>SELECT a, b FROM t</sql:query><sql:result-set><sql:row-iterator><sql:column-iterator><c name="x"><sql:get-column-name/>=<sql:get-column/></c></sql:column-iterator></sql:row-iterator></sql:result-set></sql:execute>"#,
        "<data/>",
        &mut db,
    )?;
    assert_eq!(out, r#"<c name="x">a=1</c><c name="x">b=one</c>"#);
    Ok(())
}

// ============================================================================
// get-columns
// ============================================================================

fn orders() -> ResultItem {
    ResultItem::Cursor(cursor(
        &[
            ("ORDER_ID", NativeType::Integer),
            ("CUSTOMER_NAME", NativeType::Varchar),
            ("NOTE", NativeType::Varchar),
        ],
        vec![vec![int(5), text("Ann"), SqlValue::Null]],
    ))
}

fn run_orders(row_body: &str) -> Result<String, SqlXmlError> {
    let mut db = provider();
    db.respond("SELECT * FROM orders", vec![orders()]);
    let body = format!(
        r#"<sql:execute><sql:query>SELECT * FROM orders</sql:query><sql:result-set><sql:row-iterator>{}</sql:row-iterator></sql:result-set></sql:execute>"#,
        row_body
    );
    let output = interpreter().run_to_string(
        &format!(
            r#"<r xmlns:sql="{}" xmlns:o="urn:orders">{}</r>"#,
            common::SQL_NS,
            body
        ),
        "<data/>",
        &mut db,
    )?;
    Ok(body_of(&output).to_string())
}

#[test]
fn test_get_columns_names() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    assert_eq!(
        run_orders("<sql:get-columns/>")?,
        "<ORDER_ID>5</ORDER_ID><CUSTOMER_NAME>Ann</CUSTOMER_NAME>"
    );
    assert_eq!(
        run_orders(r#"<sql:get-columns format="xml" all-elements="true"/>"#)?,
        "<order-id>5</order-id><customer-name>Ann</customer-name><note></note>"
    );
    Ok(())
}

#[test]
fn test_get_columns_prefix_and_exclude() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let out = run_orders(
        r#"<sql:get-columns format="xml" prefix="o"><sql:exclude>customer_name</sql:exclude></sql:get-columns>"#,
    )?;
    assert_eq!(out, "<o:order-id>5</o:order-id>");

    let err = run_orders(r#"<sql:get-columns prefix="zz"/>"#).unwrap_err();
    assert!(matches!(err.root(), SqlXmlError::Structure(_)), "{}", err);
    Ok(())
}

#[test]
fn test_prefixes_declared_on_directives_bind_every_output_element() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    db.respond("SELECT * FROM orders", vec![orders()]);
    db.respond("SELECT name FROM t", vec![names_cursor()]);

    let output = interpreter().run_to_string(
        &template(concat!(
            r#"<sql:execute><sql:query>SELECT name FROM t</sql:query><sql:result-set><sql:row-iterator xmlns:o="urn:o"><o:n><sql:get-column column="name"/></o:n></sql:row-iterator></sql:result-set></sql:execute>"#,
            r#"<sql:execute><sql:query>SELECT * FROM orders</sql:query><sql:result-set><sql:row-iterator><sql:get-columns prefix="c" xmlns:c="urn:c"/></sql:row-iterator></sql:result-set></sql:execute>"#,
        )),
        "<data/>",
        &mut db,
    )?;

    assert_eq!(
        body_of(&output),
        concat!(
            r#"<o:n xmlns:o="urn:o">ann</o:n><o:n xmlns:o="urn:o">bob</o:n>"#,
            r#"<c:ORDER_ID xmlns:c="urn:c">5</c:ORDER_ID><c:CUSTOMER_NAME xmlns:c="urn:c">Ann</c:CUSTOMER_NAME>"#,
        )
    );
    let reparsed = roxmltree::Document::parse(&output)?;
    assert_eq!(
        reparsed.descendants().filter(|n| n.tag_name().namespace() == Some("urn:o")).count(),
        2
    );
    Ok(())
}

// ============================================================================
// Result sets
// ============================================================================

#[test]
fn test_unbounded_result_sets_walk_every_cursor() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    let numbers = |n: i64| ResultItem::Cursor(cursor(&[("n", NativeType::Integer)], vec![vec![int(n)]]));
    db.respond("CALL two_sets()", vec![numbers(1), numbers(2)]);

    let out = run(
        r#"<sql:execute><sql:call>CALL two_sets()</sql:call><sql:result-set result-sets="unbounded"><sql:row-iterator><v><sql:get-column column="n"/></v></sql:row-iterator></sql:result-set></sql:execute>"#,
        "<data/>",
        &mut db,
    )?;

    assert_eq!(out, "<v>1</v><v>2</v>");
    assert_eq!(
        db.trace(),
        vec![
            "more_results -> true",
            "update_count -> None",
            "more_results -> false",
            "update_count -> None",
            "close",
        ]
    );
    Ok(())
}

#[test]
fn test_default_result_set_limit_is_one() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    let numbers = |n: i64| ResultItem::Cursor(cursor(&[("n", NativeType::Integer)], vec![vec![int(n)]]));
    db.respond("CALL two_sets()", vec![numbers(1), numbers(2)]);

    let out = run(
        r#"<sql:execute><sql:call>CALL two_sets()</sql:call><sql:result-set><sql:row-iterator><v><sql:get-column column="n"/></v></sql:row-iterator></sql:result-set></sql:execute>"#,
        "<data/>",
        &mut db,
    )?;
    assert_eq!(out, "<v>1</v>");
    assert_eq!(db.trace(), vec!["close"]);
    Ok(())
}

#[test]
fn test_no_results_replays_for_empty_cursor() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    db.respond(
        "SELECT name FROM empty",
        vec![ResultItem::Cursor(cursor(&[("name", NativeType::Varchar)], vec![]))],
    );
    db.respond("SELECT name FROM t", vec![names_cursor()]);

    let body = |table: &str| {
        format!(
            r#"<sql:execute><sql:query>SELECT name FROM {}</sql:query><sql:result-set><sql:row-iterator><n/></sql:row-iterator></sql:result-set><sql:no-results><none/></sql:no-results></sql:execute>"#,
            table
        )
    };
    assert_eq!(run(&body("empty"), "<data/>", &mut db)?, "<none></none>");
    assert_eq!(run(&body("t"), "<data/>", &mut db)?, "<n></n><n></n>");
    Ok(())
}

// ============================================================================
// Updates
// ============================================================================

#[test]
fn test_update_per_selected_node_sums_counts() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    db.respond("INSERT INTO t VALUES ( ? )", vec![ResultItem::UpdateCount(1)]);

    let out = run(
        r#"<sql:execute><sql:update select="/data/item">INSERT INTO t VALUES (<sql:param type="xs:string" select="@name"/>)</sql:update><c><sql:update-count/></c></sql:execute>"#,
        r#"<data><item name="a"/><item name="b"/><item name="c"/></data>"#,
        &mut db,
    )?;

    assert_eq!(out, "<c>3</c>");
    let bound: Vec<SqlValue> = db
        .executions()
        .iter()
        .map(|e| e.parameters[0].value.clone())
        .collect();
    assert_eq!(bound, vec![text("a"), text("b"), text("c")]);
    assert_eq!(db.open_results(), 0);
    Ok(())
}

#[test]
fn test_update_count_of_single_update() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    db.respond("DELETE FROM t", vec![ResultItem::UpdateCount(4)]);
    let out = run(
        "<sql:execute><sql:update>DELETE FROM t</sql:update><deleted><sql:update-count/></deleted></sql:execute>",
        "<data/>",
        &mut db,
    )?;
    assert_eq!(out, "<deleted>4</deleted>");
    Ok(())
}

#[test]
fn test_select_only_allowed_on_update() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let err = run(
        r#"<sql:execute><sql:query select="/data">SELECT 1</sql:query></sql:execute>"#,
        "<data/>",
        &mut provider(),
    )
    .unwrap_err();
    assert!(matches!(err.root(), SqlXmlError::Structure(_)), "{}", err);
    Ok(())
}

// ============================================================================
// Path expressions and literal output
// ============================================================================

#[test]
fn test_for_each_runs_a_query_per_node() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    db.respond("SELECT name FROM t WHERE id = ?", vec![names_cursor()]);

    let out = run(
        r#"<sql:for-each select="/data/id"><g><sql:value-of select="."/>:<sql:execute><sql:query>SELECT name FROM t WHERE id = <sql:param type="xs:int" select="."/></sql:query><sql:result-set><sql:row-iterator><sql:get-column column="name"/></sql:row-iterator></sql:result-set></sql:execute></g></sql:for-each>"#,
        "<data><id>3</id><id>4</id></data>",
        &mut db,
    )?;

    assert_eq!(out, r#"<g>3:annbob</g><g>4:annbob</g>"#);
    let bound: Vec<SqlValue> = db
        .executions()
        .iter()
        .map(|e| e.parameters[0].value.clone())
        .collect();
    assert_eq!(bound, vec![int(3), int(4)]);
    Ok(())
}

#[test]
fn test_iteration_functions() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    db.respond("SELECT name FROM t", vec![names_cursor()]);

    let out = run(
        r#"<sql:for-each select="/data/v"><i><sql:value-of select="sql:position()"/>=<sql:value-of select="sql:current()"/></i></sql:for-each><sql:execute><sql:query>SELECT name FROM t</sql:query><sql:result-set><sql:row-iterator><r><sql:value-of select="sql:row-position()"/>:<sql:value-of select="sql:get-column('name')"/></r></sql:row-iterator></sql:result-set></sql:execute>"#,
        "<data><v>a</v><v>b</v></data>",
        &mut db,
    )?;
    assert_eq!(out, "<i>1=a</i><i>2=b</i><r>1:ann</r><r>2:bob</r>");
    Ok(())
}

#[test]
fn test_copy_of_and_text() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let out = run(
        r#"<sql:copy-of select="/data/item"/><sql:text>a &lt; b</sql:text><sql:copy-of select="count(/data/item)"/>"#,
        r#"<data><item k="1">one</item><item k="2">two</item></data>"#,
        &mut provider(),
    )?;
    assert_eq!(out, r#"<item k="1">one</item><item k="2">two</item>a &lt; b2"#);
    Ok(())
}

// ============================================================================
// Sessions and errors
// ============================================================================

#[test]
fn test_execution_error_names_statement() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    db.fail("SELECT broken", "syntax error");
    let err = run(
        "<sql:execute><sql:query>SELECT broken</sql:query></sql:execute>",
        "<data/>",
        &mut db,
    )
    .unwrap_err();

    match err.root() {
        SqlXmlError::Execution { statement, source } => {
            assert_eq!(statement, "SELECT broken");
            assert!(matches!(source, SessionError::Engine(m) if m == "syntax error"));
        }
        other => panic!("expected an execution error, got {:?}", other),
    }
    assert!(err.to_string().contains("SELECT broken"));
    Ok(())
}

#[test]
fn test_statement_without_session_fails() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    let err = Interpreter::new(InterpreterConfig::default())
        .run_to_string(
            &template("<sql:execute><sql:update>DELETE FROM t</sql:update></sql:execute>"),
            "<data/>",
            &mut db,
        )
        .unwrap_err();
    assert!(
        matches!(
            err.root(),
            SqlXmlError::Execution {
                source: SessionError::NoSession,
                ..
            }
        ),
        "{}",
        err
    );
    Ok(())
}

#[test]
fn test_datasource_binds_named_session() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = MemoryProvider::new().with_datasource("reports");
    let out = Interpreter::new(InterpreterConfig::default()).run_to_string(
        &template(
            "<sql:config><sql:connection><sql:datasource>reports</sql:datasource><sql:execute><sql:update>DELETE FROM t</sql:update><sql:update-count/></sql:execute></sql:connection></sql:config>",
        ),
        "<data/>",
        &mut db,
    )?;
    assert_eq!(body_of(&out), "0");
    assert_eq!(db.sessions_opened(), 1);
    assert_eq!(db.executions()[0].datasource, "reports");

    let err = Interpreter::new(InterpreterConfig::default())
        .run_to_string(
            &template("<sql:connection><sql:datasource>elsewhere</sql:datasource></sql:connection>"),
            "<data/>",
            &mut db,
        )
        .unwrap_err();
    assert!(matches!(
        err.root(),
        SqlXmlError::Execution {
            source: SessionError::UnknownDatasource(_),
            ..
        }
    ));
    Ok(())
}

#[test]
fn test_default_datasource_is_opened_once() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    run(
        "<sql:execute><sql:update>DELETE FROM a</sql:update></sql:execute><sql:execute><sql:update>DELETE FROM b</sql:update></sql:execute>",
        "<data/>",
        &mut db,
    )?;
    assert_eq!(db.sessions_opened(), 1);
    assert_eq!(db.executions().len(), 2);
    Ok(())
}

#[test]
fn test_output_before_error_is_kept() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut db = provider();
    db.fail("SELECT broken", "boom");
    let interpreter = interpreter();
    let template = interpreter.parse_template(&template(
        "<before/><sql:execute><sql:query>SELECT broken</sql:query></sql:execute>",
    ))?;
    let document = sqlxml::XmlDocument::parse("<data/>")?;
    let mut sink = sqlxml::XmlWriterSink::new(Vec::new());
    assert!(interpreter.execute(&template, &document, &mut db, &mut sink).is_err());
    let written = String::from_utf8(sink.into_inner())?;
    assert!(written.contains("<before></before>"), "{}", written);
    Ok(())
}
