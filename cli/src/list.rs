use crate::error::Error;
use crate::provider::classify;
use aws_sdk_lambda::types::FunctionConfiguration;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "Name")]
    name: String,

    #[tabled(rename = "Runtime")]
    runtime: String,

    #[tabled(rename = "Handler")]
    handler: String,

    #[tabled(rename = "State")]
    state: String,
}

fn row(function: &FunctionConfiguration) -> Row {
    Row {
        name: function.function_name().unwrap_or_default().to_string(),
        runtime: function
            .runtime()
            .map(|runtime| runtime.as_str().to_string())
            .unwrap_or_default(),
        handler: function.handler().unwrap_or_default().to_string(),
        state: function
            .state()
            .map(|state| state.as_str().to_string())
            .unwrap_or_default(),
    }
}

/// Print all deployed functions as a table
pub async fn list(client: &aws_sdk_lambda::Client) -> Result<(), Error> {
    let mut stream = client.list_functions().into_paginator().items().send();
    let mut rows = Vec::new();

    while let Some(function) = stream.next().await {
        rows.push(row(&function.map_err(|err| classify(err, "functions"))?));
    }

    if rows.is_empty() {
        println!("{}", console::style("No functions deployed").yellow());
        return Ok(());
    }

    println!("{}", Table::new(rows));
    Ok(())
}
