// Copyright 2023 The Tessera Project
// SPDX-License-Identifier: BSD-3-Clause

mod helpers;
