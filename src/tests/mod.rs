// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod common;
mod conversion;
mod hcl;
mod range;
mod rule;
mod schema;
